//! HTTP-backed LLM Gateway against a local Ollama-compatible `/api/chat`
//! endpoint (or any server exposing the same `{content, usage}` JSON shape
//! from the configured wire-level contract).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{LlmError, LlmGateway, LlmRequest, LlmResponse};

pub struct OllamaGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGateway {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    async fn send(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        debug!(url, model = %self.model, "OllamaGateway::send");
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "stream": false,
            "options": {"temperature": request.temperature},
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LlmError::Transport(format!("http status {}", resp.status())));
        }

        let parsed: OllamaChatResponse =
            resp.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(LlmResponse {
            content: parsed.message.content,
            input_tokens: parsed.prompt_eval_count,
            output_tokens: parsed.eval_count,
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }

    async fn available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        self.client.get(&url).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }
}
