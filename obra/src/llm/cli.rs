//! Subprocess-invoked LLM Gateway, for an `external-cli` validator: a
//! one-shot command that accepts a prompt on stdin and emits JSON on
//! stdout. Grounded in the timeout-wrapped `tokio::process::Command`
//! pattern the teacher uses for its own subprocess validation runs.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{LlmError, LlmGateway, LlmRequest, LlmResponse};

pub struct CliGateway {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CliGateway {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self { command: command.into(), args, timeout }
    }
}

#[derive(Deserialize)]
struct CliResponse {
    content: String,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[async_trait]
impl LlmGateway for CliGateway {
    async fn send(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        debug!(command = %self.command, "CliGateway::send");
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.prompt.as_bytes())
                .await
                .map_err(|e| LlmError::Transport(e.to_string()))?;
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LlmError::Transport("timed out".to_string()))?
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !output.status.success() {
            return Err(LlmError::Transport(format!(
                "exit status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: CliResponse =
            serde_json::from_str(&stdout).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(LlmResponse {
            content: parsed.content,
            input_tokens: parsed.input_tokens,
            output_tokens: parsed.output_tokens,
        })
    }

    fn name(&self) -> &str {
        "external-cli"
    }

    async fn available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
