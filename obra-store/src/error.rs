//! Error taxonomy for the persistence layer.

use thiserror::Error;

/// Errors a `Store` operation can fail with.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("store worker panicked or was dropped: {0}")]
    WorkerGone(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
