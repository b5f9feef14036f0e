//! The structured event vocabulary emitted during task execution. Mirrors
//! the teacher's tagged `TdEvent` enum shape, re-pointed at Obra's own
//! iteration/decision/retry/session lifecycle instead of the teacher's loop
//! phases.

use serde::{Deserialize, Serialize};

use crate::decision::Decision;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObraEvent {
    TaskStarted {
        task_id: String,
        project_id: String,
    },
    IterationStarted {
        task_id: String,
        iteration: u32,
        session_id: String,
    },
    PromptAssembled {
        task_id: String,
        iteration: u32,
        fingerprint: String,
        estimated_tokens: u64,
    },
    AgentResponse {
        task_id: String,
        iteration: u32,
        total_tokens: u64,
        duration_ms: u64,
    },
    AgentOutputLine {
        task_id: String,
        iteration: u32,
        line: String,
    },
    ValidationCompleted {
        task_id: String,
        iteration: u32,
        completeness: bool,
        quality: f64,
        confidence: f64,
    },
    DecisionMade {
        task_id: String,
        iteration: u32,
        decision: Decision,
        note: Option<String>,
    },
    RetryScheduled {
        task_id: String,
        attempt: u32,
        delay_ms: u64,
        error_kind: String,
    },
    SessionRefreshed {
        project_id: String,
        old_session_id: String,
        new_session_id: String,
        reason: String,
    },
    DirectiveApplied {
        task_id: String,
        directive_id: String,
    },
    TaskBlocked {
        task_id: String,
        blocked_by: String,
    },
    TaskCompleted {
        task_id: String,
        iterations: u32,
    },
    TaskFailed {
        task_id: String,
        reason: String,
    },
    TaskEscalated {
        task_id: String,
        iteration: u32,
        reason: String,
    },
    TaskCancelled {
        task_id: String,
    },
    Warning {
        task_id: Option<String>,
        message: String,
    },
    Error {
        task_id: Option<String>,
        kind: String,
        message: String,
    },
}

impl ObraEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ObraEvent::TaskStarted { task_id, .. }
            | ObraEvent::IterationStarted { task_id, .. }
            | ObraEvent::PromptAssembled { task_id, .. }
            | ObraEvent::AgentResponse { task_id, .. }
            | ObraEvent::AgentOutputLine { task_id, .. }
            | ObraEvent::ValidationCompleted { task_id, .. }
            | ObraEvent::DecisionMade { task_id, .. }
            | ObraEvent::RetryScheduled { task_id, .. }
            | ObraEvent::DirectiveApplied { task_id, .. }
            | ObraEvent::TaskBlocked { task_id, .. }
            | ObraEvent::TaskCompleted { task_id, .. }
            | ObraEvent::TaskFailed { task_id, .. }
            | ObraEvent::TaskEscalated { task_id, .. }
            | ObraEvent::TaskCancelled { task_id } => Some(task_id),
            ObraEvent::SessionRefreshed { .. } => None,
            ObraEvent::Warning { task_id, .. } | ObraEvent::Error { task_id, .. } => task_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = ObraEvent::TaskStarted { task_id: "t1".into(), project_id: "p1".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_started");
    }
}
