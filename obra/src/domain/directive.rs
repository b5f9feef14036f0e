//! Injected-Directive Channel: out-of-band messages aimed at the Implementer
//! or the Orchestrator LLM, stored per `(project_id, task_id)` inbox.

use std::collections::HashMap;

use obra_store::{now_ms, IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveTarget {
    /// `to_impl`: appended to the next Implementer prompt.
    Implementer,
    /// `to_orch`: categorised by intent and applied to validation/decision.
    Orchestrator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveIntent {
    ValidationGuidance,
    DecisionHint,
    FeedbackRequest,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveScope {
    /// Consumed after it is applied to one iteration.
    OneShot,
    /// Persists across iterations until explicitly cleared.
    Sticky,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectedDirective {
    pub id: String,
    pub project_id: String,
    pub task_id: String,
    pub target: DirectiveTarget,
    pub intent: DirectiveIntent,
    pub scope: DirectiveScope,
    pub text: String,
    pub applied: bool,
    pub captured_at: i64,
    pub updated_at: i64,
}

impl InjectedDirective {
    pub fn to_impl(project_id: impl Into<String>, task_id: impl Into<String>, text: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: format!("directive-{}", uuid::Uuid::now_v7()),
            project_id: project_id.into(),
            task_id: task_id.into(),
            target: DirectiveTarget::Implementer,
            intent: DirectiveIntent::General,
            scope: DirectiveScope::OneShot,
            text: text.into(),
            applied: false,
            captured_at: now,
            updated_at: now,
        }
    }

    pub fn to_orch(project_id: impl Into<String>, task_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let intent = classify_intent(&text);
        let now = now_ms();
        Self {
            id: format!("directive-{}", uuid::Uuid::now_v7()),
            project_id: project_id.into(),
            task_id: task_id.into(),
            target: DirectiveTarget::Orchestrator,
            intent,
            scope: DirectiveScope::OneShot,
            text,
            applied: false,
            captured_at: now,
            updated_at: now,
        }
    }
}

impl Record for InjectedDirective {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "directives"
    }
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("project_id".into(), IndexValue::String(self.project_id.clone()));
        m.insert("task_id".into(), IndexValue::String(self.task_id.clone()));
        m.insert("applied".into(), IndexValue::Bool(self.applied));
        m
    }
}

/// Classifies a `to_orch` directive's free text into a fixed intent via
/// simple keyword heuristics (no LLM call — this must be cheap and
/// deterministic, since it gates what happens before the next iteration).
pub fn classify_intent(text: &str) -> DirectiveIntent {
    let lower = text.to_lowercase();
    if lower.contains("accept") || lower.contains("reject") || lower.contains("proceed anyway") {
        DirectiveIntent::DecisionHint
    } else if lower.contains("check for") || lower.contains("make sure") || lower.contains("validate") {
        DirectiveIntent::ValidationGuidance
    } else if lower.contains("why") || lower.contains("explain") || lower.contains("what went wrong") {
        DirectiveIntent::FeedbackRequest
    } else {
        DirectiveIntent::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_decision_hint() {
        assert_eq!(classify_intent("accept this, it's good enough"), DirectiveIntent::DecisionHint);
    }

    #[test]
    fn classifies_feedback_request() {
        assert_eq!(classify_intent("why did quality drop so much?"), DirectiveIntent::FeedbackRequest);
    }

    #[test]
    fn defaults_to_general() {
        assert_eq!(classify_intent("use tabs not spaces"), DirectiveIntent::General);
    }
}
