//! Structured, event-driven logging of iteration/decision/retry/session
//! lifecycle activity, on top of `tracing` for unstructured diagnostics.

pub mod bus;
pub mod logger;
pub mod types;

pub use bus::{EventBus, EventEmitter};
pub use logger::EventLogger;
pub use types::ObraEvent;
