//! Project: a named engineering workspace rooted at a working directory.

use std::collections::HashMap;
use std::path::PathBuf;

use obra_store::{now_ms, IndexValue, Record};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub working_dir: PathBuf,
    pub created_at: i64,
    pub updated_at: i64,
    /// A snapshot of the effective config at creation time, for audit.
    pub config_snapshot: serde_json::Value,
    pub deleted: bool,
}

impl Project {
    pub fn new(name: impl Into<String>, working_dir: PathBuf, config_snapshot: serde_json::Value) -> Self {
        let name = name.into();
        let now = now_ms();
        Self {
            id: generate_id("project", &name),
            name,
            working_dir,
            created_at: now,
            updated_at: now,
            config_snapshot,
            deleted: false,
        }
    }
}

impl Record for Project {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "projects"
    }
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("name".into(), IndexValue::String(self.name.clone()));
        m.insert("deleted".into(), IndexValue::Bool(self.deleted));
        m
    }
}
