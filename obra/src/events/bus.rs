//! `EventBus`/`EventEmitter`: a broadcast-backed pub/sub channel for
//! structured lifecycle events. Grounded in the teacher's `events::bus`
//! module (same `tokio::sync::broadcast` backbone, same cheap-clone
//! per-scope emitter handle, same fire-and-forget semantics when nobody is
//! listening), narrowed to Obra's own event vocabulary.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::ObraEvent;

const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ObraEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObraEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget: a `SendError` just means nobody is listening right
    /// now, which is a normal and expected state (no subscribers yet, or a
    /// headless `--no-stream` run).
    pub fn emit(&self, event: ObraEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(?event, "emit: no subscribers");
        }
    }

    /// A handle scoped to one task id, for call sites that don't want to
    /// thread `task_id` through every `emit` call manually.
    pub fn emitter_for(&self, task_id: impl Into<String>) -> EventEmitter {
        EventEmitter { bus: self.clone(), task_id: task_id.into() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct EventEmitter {
    bus: EventBus,
    task_id: String,
}

impl EventEmitter {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn iteration_started(&self, iteration: u32, session_id: &str) {
        self.bus.emit(ObraEvent::IterationStarted {
            task_id: self.task_id.clone(),
            iteration,
            session_id: session_id.to_string(),
        });
    }

    pub fn prompt_assembled(&self, iteration: u32, fingerprint: &str, estimated_tokens: u64) {
        self.bus.emit(ObraEvent::PromptAssembled {
            task_id: self.task_id.clone(),
            iteration,
            fingerprint: fingerprint.to_string(),
            estimated_tokens,
        });
    }

    pub fn agent_output_line(&self, iteration: u32, line: String) {
        self.bus.emit(ObraEvent::AgentOutputLine { task_id: self.task_id.clone(), iteration, line });
    }

    pub fn validation_completed(&self, iteration: u32, completeness: bool, quality: f64, confidence: f64) {
        self.bus.emit(ObraEvent::ValidationCompleted {
            task_id: self.task_id.clone(),
            iteration,
            completeness,
            quality,
            confidence,
        });
    }

    pub fn decision_made(&self, iteration: u32, decision: crate::decision::Decision, note: Option<String>) {
        self.bus.emit(ObraEvent::DecisionMade { task_id: self.task_id.clone(), iteration, decision, note });
    }

    pub fn retry_scheduled(&self, attempt: u32, delay_ms: u64, error_kind: &str) {
        self.bus.emit(ObraEvent::RetryScheduled {
            task_id: self.task_id.clone(),
            attempt,
            delay_ms,
            error_kind: error_kind.to_string(),
        });
    }

    pub fn task_completed(&self, iterations: u32) {
        self.bus.emit(ObraEvent::TaskCompleted { task_id: self.task_id.clone(), iterations });
    }

    pub fn task_failed(&self, reason: &str) {
        self.bus.emit(ObraEvent::TaskFailed { task_id: self.task_id.clone(), reason: reason.to_string() });
    }

    pub fn task_escalated(&self, iteration: u32, reason: &str) {
        self.bus.emit(ObraEvent::TaskEscalated {
            task_id: self.task_id.clone(),
            iteration,
            reason: reason.to_string(),
        });
    }

    pub fn task_cancelled(&self) {
        self.bus.emit(ObraEvent::TaskCancelled { task_id: self.task_id.clone() });
    }
}
