//! Generic persistent state management for Obra.
//!
//! Every domain entity (project, task, iteration, session, ...) implements
//! [`Record`] and is stored as a JSON blob in a shared `records` table, with
//! a companion `record_index` table carrying whatever fields that entity
//! wants queryable. This keeps the schema generic across entity types
//! instead of growing a bespoke table per collection.

mod error;
mod migrations;
mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use record::{now_ms, Filter, FilterOp, IndexValue, Record};
pub use store::{RowLock, Store};
