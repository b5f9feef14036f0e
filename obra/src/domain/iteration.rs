//! Iteration: one pass through the control loop for a given task. Append-only.

use std::collections::HashMap;

use obra_store::{now_ms, IndexValue, Record};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub cache_create: u64,
    pub cache_read: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.cache_create + self.cache_read + self.output
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    pub id: String,
    pub task_id: String,
    pub session_id: String,
    pub number: u32,
    pub prompt_fingerprint: String,
    pub raw_response: String,
    pub parsed_artifacts: serde_json::Value,
    pub completeness: bool,
    pub quality: f64,
    pub confidence: f64,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    pub decision: Decision,
    pub breakpoint: bool,
    pub cost_units: f64,
    pub error_class: Option<String>,
    pub created_at: i64,
}

impl Iteration {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: impl Into<String>,
        session_id: impl Into<String>,
        number: u32,
        prompt_fingerprint: impl Into<String>,
        raw_response: impl Into<String>,
        usage: TokenUsage,
        latency_ms: u64,
    ) -> Self {
        let task_id = task_id.into();
        Self {
            id: format!("{}-iter-{:03}", task_id, number),
            task_id,
            session_id: session_id.into(),
            number,
            prompt_fingerprint: prompt_fingerprint.into(),
            raw_response: raw_response.into(),
            parsed_artifacts: serde_json::Value::Null,
            completeness: false,
            quality: 0.0,
            confidence: 0.0,
            usage,
            latency_ms,
            decision: Decision::Retry,
            breakpoint: false,
            cost_units: 0.0,
            error_class: None,
            created_at: now_ms(),
        }
    }
}

impl Record for Iteration {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.created_at
    }
    fn collection_name() -> &'static str {
        "iterations"
    }
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("task_id".into(), IndexValue::String(self.task_id.clone()));
        m.insert("session_id".into(), IndexValue::String(self.session_id.clone()));
        m.insert("number".into(), IndexValue::Int(self.number as i64));
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_tokens_is_sum_of_components() {
        let usage = TokenUsage { input: 100, cache_create: 20, cache_read: 30, output: 50 };
        assert_eq!(usage.total(), 200);
    }
}
