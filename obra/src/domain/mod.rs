//! Domain entities: the data model Obra persists.

pub mod directive;
pub mod file_change;
pub mod id;
pub mod iteration;
pub mod milestone;
pub mod project;
pub mod retry_attempt;
pub mod session;
pub mod task;

pub use directive::{DirectiveIntent, DirectiveScope, DirectiveTarget, InjectedDirective};
pub use file_change::{ChangeKind, FileChangeEvent};
pub use id::DomainId;
pub use iteration::{Iteration, TokenUsage};
pub use milestone::Milestone;
pub use project::Project;
pub use retry_attempt::RetryAttempt;
pub use session::{Session, SessionState};
pub use task::{Task, TaskStatus, TaskType};
