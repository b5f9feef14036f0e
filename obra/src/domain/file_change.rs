//! File-Change Event: an observed mutation in the working directory during an iteration.

use std::collections::HashMap;
use std::path::PathBuf;

use obra_store::{now_ms, IndexValue, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub id: String,
    pub iteration_id: String,
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub content_hash: Option<String>,
    pub observed_at: i64,
}

impl FileChangeEvent {
    pub fn new(iteration_id: impl Into<String>, path: PathBuf, kind: ChangeKind, content_hash: Option<String>) -> Self {
        let iteration_id = iteration_id.into();
        Self {
            id: format!("{}-{}-{}", iteration_id, path.display(), now_ms()),
            iteration_id,
            path,
            kind,
            content_hash,
            observed_at: now_ms(),
        }
    }
}

impl Record for FileChangeEvent {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.observed_at
    }
    fn collection_name() -> &'static str {
        "file_change_events"
    }
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut m = HashMap::new();
        m.insert("iteration_id".into(), IndexValue::String(self.iteration_id.clone()));
        m.insert("path".into(), IndexValue::String(self.path.display().to_string()));
        m
    }
}

/// Collapses a burst of raw filesystem events within `window_ms` of each
/// other, keeping one event per path (the most recent kind observed).
pub fn debounce(events: Vec<(PathBuf, ChangeKind, i64)>, window_ms: i64) -> Vec<(PathBuf, ChangeKind, i64)> {
    let mut by_path: HashMap<PathBuf, (ChangeKind, i64)> = HashMap::new();
    for (path, kind, observed_at) in events {
        match by_path.get_mut(&path) {
            Some((existing_kind, existing_at)) if observed_at - *existing_at <= window_ms => {
                *existing_kind = kind;
                *existing_at = observed_at;
            }
            _ => {
                by_path.insert(path, (kind, observed_at));
            }
        }
    }
    by_path.into_iter().map(|(path, (kind, at))| (path, kind, at)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_collapses_bursts_per_path() {
        let events = vec![
            (PathBuf::from("a.rs"), ChangeKind::Modified, 0),
            (PathBuf::from("a.rs"), ChangeKind::Modified, 100),
            (PathBuf::from("a.rs"), ChangeKind::Deleted, 200),
            (PathBuf::from("b.rs"), ChangeKind::Created, 0),
        ];
        let result = debounce(events, 500);
        assert_eq!(result.len(), 2);
        let a = result.iter().find(|(p, ..)| p == &PathBuf::from("a.rs")).unwrap();
        assert_eq!(a.1, ChangeKind::Deleted);
    }
}
