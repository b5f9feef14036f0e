//! Retry Attempt: persisted backoff state so a crash mid-retry can resume
//! without losing the attempt counter or over-retrying immediately.

use std::collections::HashMap;

use obra_store::{now_ms, IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub id: String,
    pub task_id: String,
    pub attempt: u32,
    pub error_class: String,
    pub occurred_at: i64,
    pub next_retry_at: i64,
}

impl RetryAttempt {
    pub fn new(task_id: impl Into<String>, attempt: u32, error_class: impl Into<String>, delay_ms: i64) -> Self {
        let task_id = task_id.into();
        let occurred_at = now_ms();
        Self {
            id: format!("{task_id}-retry-{attempt}"),
            task_id,
            attempt,
            error_class: error_class.into(),
            occurred_at,
            next_retry_at: occurred_at + delay_ms,
        }
    }
}

impl Record for RetryAttempt {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.occurred_at
    }
    fn collection_name() -> &'static str {
        "retry_attempts"
    }
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("task_id".into(), IndexValue::String(self.task_id.clone()));
        m.insert("attempt".into(), IndexValue::Int(self.attempt as i64));
        m
    }
}
