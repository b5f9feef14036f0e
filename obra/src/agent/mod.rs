//! Agent Driver: lifecycle of the external Implementer process. Grounded in
//! the teacher's `loop/validation.rs` subprocess-plus-timeout-plus-streaming
//! pattern, adapted from one-shot-per-call to a long-lived process that
//! takes repeated `send_prompt` calls over its lifetime.

pub mod subprocess;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TokenUsage;

#[derive(Debug, Clone, Default)]
pub struct SendPromptOptions {
    pub max_turns: Option<u32>,
    pub session_id: Option<String>,
    pub structured_output: bool,
    pub bypass_interactive_permissions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub content: String,
    pub session_id: String,
    pub usage: TokenUsage,
    pub duration_ms: u64,
    pub num_turns: u32,
    pub error_subtype: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct AgentHealth {
    pub alive: bool,
    pub last_latency_ms: Option<u64>,
    pub restart_count: u32,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent failed to reach a stable ready state: {0}")]
    NotReady(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("agent exhausted max_turns={max_turns}")]
    MaxTurnsExhausted { max_turns: u32 },
    #[error("agent response violated the declared schema: {0}")]
    Schema(String),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: std::path::PathBuf,
    pub stability_window: std::time::Duration,
    pub response_timeout: std::time::Duration,
}

#[async_trait]
pub trait AgentDriver: Send + Sync {
    async fn initialize(&mut self, config: AgentConfig) -> Result<(), AgentError>;
    async fn send_prompt(
        &mut self,
        prompt: &str,
        opts: SendPromptOptions,
    ) -> Result<StructuredResponse, AgentError>;
    async fn health(&self) -> AgentHealth;
    async fn shutdown(&mut self);
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    pub struct MockAgentDriver {
        pub responses: VecDeque<Result<StructuredResponse, AgentError>>,
        pub restart_count: u32,
    }

    impl MockAgentDriver {
        pub fn new(responses: Vec<Result<StructuredResponse, AgentError>>) -> Self {
            Self { responses: responses.into(), restart_count: 0 }
        }
    }

    #[async_trait]
    impl AgentDriver for MockAgentDriver {
        async fn initialize(&mut self, _config: AgentConfig) -> Result<(), AgentError> {
            Ok(())
        }

        async fn send_prompt(
            &mut self,
            _prompt: &str,
            _opts: SendPromptOptions,
        ) -> Result<StructuredResponse, AgentError> {
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Transport("mock exhausted".into())))
        }

        async fn health(&self) -> AgentHealth {
            AgentHealth { alive: true, last_latency_ms: None, restart_count: self.restart_count }
        }

        async fn shutdown(&mut self) {}
    }
}
