//! LLM Gateway: uniform request/response against the Orchestrator LLM,
//! grounded in the teacher's `LlmClient` trait shape — same async-trait
//! seam, same mock-with-canned-responses test pattern — but deliberately
//! stateless (no implicit conversation state; any conversation
//! lives in the Implementer's session, not here).

pub mod cli;
pub mod ollama;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
    /// Caps generation at low temperature for reproducible scoring.
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), max_tokens: None, temperature: 0.0 }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("gateway unavailable")]
    Unavailable,
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn send(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn name(&self) -> &str;
    async fn available(&self) -> bool;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns canned responses in order; errors with `InvalidResponse` once
    /// exhausted. Mirrors the teacher's `MockLlmClient` test double.
    pub struct MockLlmGateway {
        responses: Mutex<Vec<Result<LlmResponse, LlmError>>>,
        call_count: AtomicUsize,
    }

    impl MockLlmGateway {
        pub fn new(responses: Vec<Result<LlmResponse, LlmError>>) -> Self {
            Self { responses: Mutex::new(responses), call_count: AtomicUsize::new(0) }
        }

        pub fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmGateway for MockLlmGateway {
        async fn send(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::InvalidResponse("mock exhausted".into()));
            }
            responses.remove(0)
        }

        fn name(&self) -> &str {
            "mock"
        }

        async fn available(&self) -> bool {
            true
        }
    }
}
