//! Session & Context Manager: tracks cumulative token use per session,
//! decides when to refresh, and carries Epic-level summaries forward.

use obra_store::Store;
use tracing::{debug, info};

use crate::domain::{Session, SessionState};
use crate::error::{ObraError, ObraResult};
use crate::llm::{LlmGateway, LlmRequest};

#[derive(Debug, Clone, Copy)]
pub struct ContextWindowConfig {
    pub limit: u64,
    pub warning_threshold: f64,
    pub refresh_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self { limit: 200_000, warning_threshold: 0.70, refresh_threshold: 0.80, critical_threshold: 0.95 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSignal {
    Ok,
    Warning,
    Refresh,
    Critical,
}

pub fn classify_usage(session: &Session, config: &ContextWindowConfig) -> ThresholdSignal {
    let fraction = session.usage_fraction(config.limit);
    if fraction >= config.critical_threshold {
        ThresholdSignal::Critical
    } else if fraction >= config.refresh_threshold {
        ThresholdSignal::Refresh
    } else if fraction >= config.warning_threshold {
        ThresholdSignal::Warning
    } else {
        ThresholdSignal::Ok
    }
}

pub struct SessionManager {
    store: Store,
    config: ContextWindowConfig,
}

impl SessionManager {
    pub fn new(store: Store, config: ContextWindowConfig) -> Self {
        Self { store, config }
    }

    /// Opens a session for `epic_id` within `project_id`, prepending the
    /// predecessor Epic's summary as the starting context if one exists.
    pub async fn open_for_epic(&self, project_id: &str, epic_id: Option<String>) -> ObraResult<(Session, Option<String>)> {
        let epic_context_summary = if let Some(epic_id) = &epic_id {
            self.latest_epic_summary(epic_id).await?
        } else {
            None
        };
        let session = Session::open(project_id, epic_id);
        self.store.put(&session).await?;
        Ok((session, epic_context_summary))
    }

    async fn latest_epic_summary(&self, epic_id: &str) -> ObraResult<Option<String>> {
        let sessions: Vec<Session> = self
            .store
            .query(&[obra_store::Filter::eq("epic_id", obra_store::IndexValue::String(epic_id.to_string()))])
            .await?;
        Ok(sessions
            .into_iter()
            .filter(|s| s.summary.is_some())
            .max_by_key(|s| s.ended_at.unwrap_or(0))
            .and_then(|s| s.summary))
    }

    /// Checks thresholds for `session` and refreshes it if required,
    /// returning the session the caller should use for the next iteration
    /// (unchanged, or the newly-opened successor).
    pub async fn maybe_refresh(
        &self,
        session: Session,
        llm: &dyn LlmGateway,
        iteration_history: &str,
        epic_description: &str,
    ) -> ObraResult<Session> {
        match classify_usage(&session, &self.config) {
            ThresholdSignal::Warning => {
                debug!(session_id = %session.id, fraction = session.usage_fraction(self.config.limit), "session approaching refresh threshold");
                Ok(session)
            }
            ThresholdSignal::Ok => Ok(session),
            ThresholdSignal::Refresh | ThresholdSignal::Critical => {
                self.refresh(session, llm, iteration_history, epic_description).await
            }
        }
    }

    async fn refresh(
        &self,
        mut session: Session,
        llm: &dyn LlmGateway,
        iteration_history: &str,
        epic_description: &str,
    ) -> ObraResult<Session> {
        let summary = self.summarize(llm, iteration_history, epic_description).await?;
        let starting_tokens = estimate_tokens(&summary);

        let mut successor = Session::continued_from(&session, starting_tokens);
        self.store.put(&successor).await?;

        session.mark_refreshed(summary, &successor.id);
        self.store.put(&session).await?;

        info!(old = %session.id, new = %successor.id, "session refreshed");
        successor.predecessor_session_id = Some(session.id.clone());
        Ok(successor)
    }

    async fn summarize(&self, llm: &dyn LlmGateway, iteration_history: &str, epic_description: &str) -> ObraResult<String> {
        let prompt = format!(
            "Summarize progress so far for this epic in under 300 words.\n\nEpic:\n{epic_description}\n\nIteration history:\n{iteration_history}"
        );
        let response = llm
            .send(LlmRequest::new(prompt))
            .await
            .map_err(|e| ObraError::Transport { component: "llm_gateway", source: Box::new(e) })?;
        Ok(response.content)
    }

    pub async fn add_tokens(&self, session: &mut Session, total: u64) -> ObraResult<()> {
        session.add_tokens(total);
        self.store.put(session).await?;
        Ok(())
    }
}

/// chars/4 heuristic token-count estimate, used where the config's own
/// tokenizer isn't available — see SPEC_FULL.md's resolution of the
/// token-budget Open Question.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_usage_boundaries() {
        let mut session = Session::open("p1", None);
        let config = ContextWindowConfig::default();
        session.add_tokens((config.limit as f64 * 0.75) as u64);
        assert_eq!(classify_usage(&session, &config), ThresholdSignal::Warning);

        let mut session = Session::open("p1", None);
        session.add_tokens((config.limit as f64 * 0.82) as u64);
        assert_eq!(classify_usage(&session, &config), ThresholdSignal::Refresh);

        let mut session = Session::open("p1", None);
        session.add_tokens((config.limit as f64 * 0.96) as u64);
        assert_eq!(classify_usage(&session, &config), ThresholdSignal::Critical);
    }

    #[test]
    fn estimate_tokens_uses_chars_over_four() {
        assert_eq!(estimate_tokens("12345678"), 2);
    }
}
