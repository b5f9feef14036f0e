//! Error taxonomy. Each kind names which component it failed in so a
//! user-visible message can always say where things broke without leaking a
//! raw stack trace.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObraError {
    #[error("transport error talking to {component}: {source}")]
    Transport {
        component: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("agent exhausted max_turns={max_turns} on task {task_id}")]
    AgentMaxTurns { task_id: String, max_turns: u32 },

    #[error("validator response for task {task_id} could not be parsed: {reason}")]
    ValidatorParse { task_id: String, reason: String },

    #[error("implementer response for task {task_id} violated the declared schema: {reason}")]
    Schema { task_id: String, reason: String },

    #[error("dependency cycle: {0}")]
    DependencyCycle(#[from] crate::scheduler::DependencyCycleError),

    #[error("task {task_id} is already running")]
    TaskAlreadyRunning { task_id: String },

    #[error("could not assemble a prompt for task {task_id} within the token budget")]
    ContextOverflow { task_id: String },

    #[error("task {task_id} was cancelled at a suspension point")]
    Cancellation { task_id: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] obra_store::StoreError),
}

impl ObraError {
    /// The taxonomy name used by `crate::retry::classify` and in user-facing
    /// messages; kept separate from `Display` so the two can evolve
    /// independently (the message is for humans, the kind is for routing).
    pub fn kind(&self) -> &'static str {
        match self {
            ObraError::Transport { .. } => "TransportError",
            ObraError::AgentMaxTurns { .. } => "AgentMaxTurnsError",
            ObraError::ValidatorParse { .. } => "ValidatorParseError",
            ObraError::Schema { .. } => "SchemaError",
            ObraError::DependencyCycle(_) => "DependencyCycleError",
            ObraError::TaskAlreadyRunning { .. } => "TaskAlreadyRunningError",
            ObraError::ContextOverflow { .. } => "ContextOverflowError",
            ObraError::Cancellation { .. } => "CancellationError",
            ObraError::Configuration(_) => "ConfigurationError",
            ObraError::Store(_) => "PersistenceError",
        }
    }

    pub fn component(&self) -> &'static str {
        match self {
            ObraError::Transport { component, .. } => component,
            ObraError::AgentMaxTurns { .. } => "agent",
            ObraError::ValidatorParse { .. } => "validator",
            ObraError::Schema { .. } => "validator",
            ObraError::DependencyCycle(_) => "scheduler",
            ObraError::TaskAlreadyRunning { .. } => "scheduler",
            ObraError::ContextOverflow { .. } => "prompt_assembler",
            ObraError::Cancellation { .. } => "controller",
            ObraError::Configuration(_) => "config",
            ObraError::Store(_) => "persistence",
        }
    }
}

pub type ObraResult<T> = Result<T, ObraError>;
