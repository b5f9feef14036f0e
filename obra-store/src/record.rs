//! The `Record` trait and supporting types every persisted entity implements.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
///
/// Centralized so every entity stamps `created_at`/`updated_at` the same way.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

/// A scalar value that can be indexed for equality/ordering lookups.
///
/// Stored as an EAV row (`collection`, `id`, `field`, `value`) rather than a
/// dedicated column per entity, since the store is generic across every
/// record type in the crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl IndexValue {
    /// Canonical text form used for EAV storage and comparison.
    pub fn as_sql_text(&self) -> String {
        match self {
            IndexValue::String(s) => s.clone(),
            IndexValue::Int(i) => i.to_string(),
            IndexValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        }
    }
}

/// Every entity the store persists implements this: a stable id, an
/// `updated_at` for optimistic ordering, the collection (table) it lives in,
/// and the subset of its fields that should be queryable by equality.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn updated_at(&self) -> i64;
    fn collection_name() -> &'static str
    where
        Self: Sized;
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// Equality/comparison operator for a `Filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// A single `field op value` predicate evaluated against a record's indexed
/// fields. `Store::query` ANDs every filter passed to it.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }
}
