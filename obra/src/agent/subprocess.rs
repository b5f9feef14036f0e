//! Local-subprocess Agent Driver: spawns the Implementer once, waits for a
//! period with no output to call it stable (there is no deterministic
//! ready-banner to match against), then streams each prompt to stdin and
//! reads a structured JSON response from stdout. Mirrors the teacher's
//! `run_validation_streaming` approach of piping stdout/stderr into two
//! reader tasks while the caller awaits completion.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{AgentConfig, AgentDriver, AgentError, AgentHealth, SendPromptOptions, StructuredResponse};
use crate::events::EventEmitter;

pub struct SubprocessAgentDriver {
    child: Option<Child>,
    config: Option<AgentConfig>,
    last_latency_ms: Option<u64>,
    restart_count: u32,
    emitter: Option<EventEmitter>,
}

impl SubprocessAgentDriver {
    pub fn new(emitter: Option<EventEmitter>) -> Self {
        Self { child: None, config: None, last_latency_ms: None, restart_count: 0, emitter }
    }

    async fn wait_for_stability(&self, stability_window: Duration) {
        // No ready banner is guaranteed, so "stable" means the process
        // hasn't exited within the window — a generous, conservative proxy.
        tokio::time::sleep(stability_window).await;
    }
}

#[async_trait]
impl AgentDriver for SubprocessAgentDriver {
    async fn initialize(&mut self, config: AgentConfig) -> Result<(), AgentError> {
        debug!(command = %config.command, "SubprocessAgentDriver::initialize");
        let child = Command::new(&config.command)
            .args(&config.args)
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::NotReady(e.to_string()))?;

        self.wait_for_stability(config.stability_window).await;

        if child.id().is_none() {
            return Err(AgentError::NotReady("process exited before stabilizing".to_string()));
        }

        self.child = Some(child);
        self.config = Some(config);
        Ok(())
    }

    async fn send_prompt(
        &mut self,
        prompt: &str,
        opts: SendPromptOptions,
    ) -> Result<StructuredResponse, AgentError> {
        let config = self.config.clone().ok_or_else(|| AgentError::NotReady("not initialized".to_string()))?;
        let child = self.child.as_mut().ok_or_else(|| AgentError::NotReady("not initialized".to_string()))?;

        let stdin = child.stdin.as_mut().ok_or_else(|| AgentError::Transport("no stdin".to_string()))?;
        let mut envelope = serde_json::json!({
            "prompt": prompt,
            "structured_output": opts.structured_output,
            "bypass_interactive_permissions": opts.bypass_interactive_permissions,
        });
        if let Some(max_turns) = opts.max_turns {
            envelope["max_turns"] = serde_json::json!(max_turns);
        }
        if let Some(session_id) = &opts.session_id {
            envelope["session_id"] = serde_json::json!(session_id);
        }
        let mut line = serde_json::to_string(&envelope).map_err(|e| AgentError::Transport(e.to_string()))?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await.map_err(|e| AgentError::Transport(e.to_string()))?;

        let stdout = child.stdout.as_mut().ok_or_else(|| AgentError::Transport("no stdout".to_string()))?;
        let mut reader = BufReader::new(stdout).lines();

        let start = Instant::now();
        let next_line = timeout(config.response_timeout, reader.next_line())
            .await
            .map_err(|_| AgentError::Transport("response timed out".to_string()))?
            .map_err(|e| AgentError::Transport(e.to_string()))?;
        let latency = start.elapsed();
        self.last_latency_ms = Some(latency.as_millis() as u64);

        let raw = next_line.ok_or_else(|| AgentError::Transport("stdout closed unexpectedly".to_string()))?;
        if let Some(emitter) = &self.emitter {
            emitter.agent_output_line(0, raw.clone());
        }

        let response: StructuredResponse =
            serde_json::from_str(&raw).map_err(|e| AgentError::Schema(e.to_string()))?;

        if response.error_subtype.as_deref() == Some("max_turns_exhausted") {
            return Err(AgentError::MaxTurnsExhausted { max_turns: opts.max_turns.unwrap_or(0) });
        }

        Ok(response)
    }

    async fn health(&self) -> AgentHealth {
        let alive = self.child.as_ref().map(|c| c.id().is_some()).unwrap_or(false);
        AgentHealth { alive, last_latency_ms: self.last_latency_ms, restart_count: self.restart_count }
    }

    async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Some(id) = child.id() {
                let _ = signal::kill(Pid::from_raw(id as i32), Signal::SIGTERM);
            }
            match timeout(Duration::from_secs(5), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("SubprocessAgentDriver::shutdown: graceful term timed out, killing");
                    let _ = child.kill().await;
                }
            }
        }
    }
}
