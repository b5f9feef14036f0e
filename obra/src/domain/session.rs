//! Session: a logical conversation with the Implementer, bounded by a
//! context-window token budget.

use std::collections::HashMap;

use obra_store::{now_ms, IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Refreshed,
    Ended,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Refreshed => "refreshed",
            SessionState::Ended => "ended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub epic_id: Option<String>,
    pub state: SessionState,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub cumulative_tokens: u64,
    pub summary: Option<String>,
    pub predecessor_session_id: Option<String>,
    pub successor_session_id: Option<String>,
    pub updated_at: i64,
}

impl Session {
    pub fn open(project_id: impl Into<String>, epic_id: Option<String>) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            project_id: project_id.into(),
            epic_id,
            state: SessionState::Active,
            started_at: now,
            ended_at: None,
            cumulative_tokens: 0,
            summary: None,
            predecessor_session_id: None,
            successor_session_id: None,
            updated_at: now,
        }
    }

    /// Continues a prior session's Epic context after a refresh. Starts the
    /// cumulative counter at an estimate of the summary's own token cost, per
    /// the scenario in the concrete end-to-end test: the new session does not
    /// start at zero if the summary itself consumes budget.
    pub fn continued_from(predecessor: &Session, starting_tokens: u64) -> Self {
        let mut s = Session::open(predecessor.project_id.clone(), predecessor.epic_id.clone());
        s.predecessor_session_id = Some(predecessor.id.clone());
        s.cumulative_tokens = starting_tokens;
        s
    }

    /// Adds a non-negative iteration token total. Cumulative tokens never decrease.
    pub fn add_tokens(&mut self, total: u64) {
        self.cumulative_tokens += total;
        self.updated_at = now_ms();
    }

    pub fn usage_fraction(&self, context_limit: u64) -> f64 {
        if context_limit == 0 {
            return 0.0;
        }
        self.cumulative_tokens as f64 / context_limit as f64
    }

    pub fn mark_refreshed(&mut self, summary: String, successor_id: &str) {
        self.state = SessionState::Refreshed;
        self.summary = Some(summary);
        self.successor_session_id = Some(successor_id.to_string());
        self.ended_at = Some(now_ms());
        self.updated_at = now_ms();
    }

    pub fn end(&mut self, summary: Option<String>) {
        self.state = SessionState::Ended;
        self.summary = summary;
        self.ended_at = Some(now_ms());
        self.updated_at = now_ms();
    }
}

impl Record for Session {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "sessions"
    }
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("project_id".into(), IndexValue::String(self.project_id.clone()));
        m.insert("state".into(), IndexValue::String(self.state.as_str().to_string()));
        if let Some(epic_id) = &self.epic_id {
            m.insert("epic_id".into(), IndexValue::String(epic_id.clone()));
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_tokens_never_decrease() {
        let mut s = Session::open("p1", None);
        s.add_tokens(100);
        s.add_tokens(50);
        assert_eq!(s.cumulative_tokens, 150);
    }

    #[test]
    fn continued_session_links_predecessor() {
        let mut pred = Session::open("p1", Some("epic-1".into()));
        pred.add_tokens(180_000);
        let succ = Session::continued_from(&pred, 500);
        assert_eq!(succ.predecessor_session_id.as_deref(), Some(pred.id.as_str()));
        assert_eq!(succ.epic_id.as_deref(), Some("epic-1"));
        assert_eq!(succ.cumulative_tokens, 500);
    }
}
