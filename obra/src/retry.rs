//! Retry Coordinator: classifies failures, tracks per-task attempts, and
//! computes full-jitter exponential backoff delays.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Terminal,
}

/// Classifies an error kind name (see `crate::error::ObraError`) into
/// retryable vs. terminal.
pub fn classify(error_kind: &str) -> ErrorClass {
    match error_kind {
        "TransportError" | "AgentMaxTurnsError" | "ValidatorParseError" => ErrorClass::Retryable,
        "SchemaError"
        | "DependencyCycleError"
        | "TaskAlreadyRunningError"
        | "CancellationError"
        | "ConfigurationError" => ErrorClass::Terminal,
        // ContextOverflowError triggers an immediate refresh rather than a
        // normal backoff retry; callers handle it before reaching here.
        _ => ErrorClass::Terminal,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }
}

/// Computes `delay = min(base * factor^attempt, max) * U(0.5, 1.5)`.
/// `attempt` is 1-based (the first retry is attempt 1).
pub fn backoff_delay_ms(config: &RetryConfig, attempt: u32) -> u64 {
    let raw = config.base_delay_ms as f64 * config.backoff_factor.powi(attempt as i32);
    let capped = raw.min(config.max_delay_ms as f64);
    let jitter = rand::rng().random_range(0.5..1.5);
    (capped * jitter) as u64
}

/// Tracks the attempt counter for every in-flight task. Cleared when a task
/// reaches a terminal state or succeeds.
#[derive(Debug, Default)]
pub struct RetryCoordinator {
    config: RetryConfig,
    attempts: HashMap<String, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for this many milliseconds, then re-enter the failed step.
    RetryAfterMs(u64),
    /// Attempts exhausted; the caller must raise a terminal error.
    CapExceeded,
}

impl RetryCoordinator {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempts: HashMap::new() }
    }

    /// Records a failure for `task_id` and returns whether/how long to wait
    /// before retrying. Only call this for errors classified `Retryable`.
    pub fn record_failure(&mut self, task_id: &str) -> (u32, RetryDecision) {
        let attempt = self.attempts.entry(task_id.to_string()).or_insert(0);
        *attempt += 1;
        let attempt = *attempt;
        if attempt > self.config.max_retries {
            (attempt, RetryDecision::CapExceeded)
        } else {
            (attempt, RetryDecision::RetryAfterMs(backoff_delay_ms(&self.config, attempt)))
        }
    }

    pub fn reset(&mut self, task_id: &str) {
        self.attempts.remove(task_id);
    }

    pub fn attempt_count(&self, task_id: &str) -> u32 {
        self.attempts.get(task_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_is_capped() {
        let config = RetryConfig { max_retries: 10, base_delay_ms: 1000, max_delay_ms: 5000, backoff_factor: 2.0 };
        for attempt in 1..=10 {
            let delay = backoff_delay_ms(&config, attempt);
            assert!(delay <= 7500, "delay {delay} exceeds max*1.5 jitter bound");
        }
    }

    #[test]
    fn cap_exceeded_after_max_retries() {
        let mut coordinator = RetryCoordinator::new(RetryConfig { max_retries: 3, ..Default::default() });
        for _ in 0..3 {
            let (_, decision) = coordinator.record_failure("t1");
            assert!(matches!(decision, RetryDecision::RetryAfterMs(_)));
        }
        let (attempt, decision) = coordinator.record_failure("t1");
        assert_eq!(attempt, 4);
        assert_eq!(decision, RetryDecision::CapExceeded);
    }

    #[test]
    fn reset_clears_attempt_counter() {
        let mut coordinator = RetryCoordinator::new(RetryConfig::default());
        coordinator.record_failure("t1");
        coordinator.reset("t1");
        assert_eq!(coordinator.attempt_count("t1"), 0);
    }

    #[test]
    fn transport_error_is_retryable_schema_error_is_terminal() {
        assert_eq!(classify("TransportError"), ErrorClass::Retryable);
        assert_eq!(classify("SchemaError"), ErrorClass::Terminal);
    }
}
