//! Obra — a local orchestrator that drives an external code-generation
//! agent through audited, multi-iteration tasks.
//!
//! # Core Concepts
//!
//! - **Bounded iteration**: every task runs through a controller loop that
//!   assembles a prompt, submits it to the agent, validates the response,
//!   and decides whether to proceed, retry, clarify, or escalate.
//! - **Cheap validation, expensive generation**: a smaller Orchestrator LLM
//!   scores completeness and quality so the Decision Engine never has to
//!   trust the Implementer's own claim of being done.
//! - **State in files, not memory**: tasks, sessions, and iterations persist
//!   through `obra_store` so a crashed process resumes cleanly.
//! - **Dependency-aware scheduling**: tasks only become READY once every
//!   dependency has completed; a failed task cascades a BLOCKED status to
//!   its dependents instead of leaving them silently stuck.
//!
//! # Modules
//!
//! - [`domain`] — the persisted data model (projects, tasks, sessions, iterations, ...)
//! - [`decision`] — the pure Decision Engine
//! - [`scheduler`] — the in-memory dependency graph
//! - [`retry`] — error classification and backoff
//! - [`session_manager`] — context-window tracking and session refresh
//! - [`prompt`] — prompt assembly and truncation
//! - [`llm`] — the Orchestrator LLM gateway
//! - [`agent`] — the Implementer agent driver
//! - [`validator`] — the completeness/quality/confidence pipeline
//! - [`controller`] — the per-task iteration state machine
//! - [`orchestrator`] — the multi-task concurrent runner
//! - [`persistence`] — composite store queries
//! - [`config`] — layered configuration
//! - [`events`] — the structured event bus
//! - [`watcher`] — polling-based file-change observation
//! - [`git`] — the post-task commit hook
//! - [`cli`] — command-line interface

#![allow(dead_code)]

pub mod agent;
pub mod cli;
pub mod config;
pub mod controller;
pub mod decision;
pub mod domain;
pub mod error;
pub mod events;
pub mod git;
pub mod llm;
pub mod orchestrator;
pub mod persistence;
pub mod prompt;
pub mod retry;
pub mod scheduler;
pub mod session_manager;
pub mod validator;
pub mod watcher;

pub use config::Config;
pub use domain::{Iteration, Milestone, Project, Session, Task, TaskStatus, TaskType};
pub use error::{ObraError, ObraResult};
pub use events::{EventBus, EventEmitter, ObraEvent};
pub use orchestrator::{ControllerTaskRunner, Orchestrator, TaskRunner};
pub use persistence::Persistence;
