//! `Store`: a SQLite-backed, generic record store with an EAV index.
//!
//! One physical table (`records`) holds every entity as a JSON blob keyed by
//! `(collection, id)`; a companion `record_index` table holds the subset of
//! fields each `Record` declares as indexed, so equality/range queries don't
//! require a bespoke schema per entity. This mirrors the "generic persistent
//! state management" role the teacher's `taskstore` crate describes, scoped
//! down to SQLite (no JSONL/git mirroring — see DESIGN.md).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::migrations::run_migrations;
use crate::record::{Filter, FilterOp, IndexValue, Record};

/// A handle to the SQLite-backed store. Cheap to clone (shares the
/// connection and per-key lock registry behind `Arc`s).
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    row_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// A held per-row lock. Dropping it releases the underlying `tokio::sync::Mutex` guard.
pub struct RowLock {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

impl Store {
    /// Open (creating if necessary) a store backed by the SQLite file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> StoreResult<Connection> {
            let mut conn = Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            run_migrations(&mut conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::WorkerGone(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            row_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Open an in-memory store. Useful for tests and the `--dry-run` CLI path.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            row_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Acquire the per-key lock for `key` (a task, session, or project id).
    ///
    /// Serializes writes to a single logical row beyond what SQLite's own
    /// transaction isolation gives a single embedded process, per the
    /// concurrency model's "writes use per-row locks" requirement.
    pub async fn lock_key(&self, key: &str) -> RowLock {
        let mutex = {
            let mut locks = self.row_locks.lock().await;
            locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let guard = mutex.lock_owned().await;
        RowLock { _guard: guard }
    }

    /// Insert or overwrite a record.
    pub async fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        let collection = R::collection_name();
        let id = record.id().to_string();
        let updated_at = record.updated_at();
        let data = serde_json::to_string(record)?;
        let indexed = record.indexed_fields();
        debug!(collection, %id, fields = indexed.len(), "Store::put");

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO records (collection, id, updated_at, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET updated_at = excluded.updated_at, data = excluded.data",
            params![collection, id, updated_at, data],
        )?;
        conn.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        for (field, value) in indexed {
            conn.execute(
                "INSERT INTO record_index (collection, id, field, value) VALUES (?1, ?2, ?3, ?4)",
                params![collection, id, field, value.as_sql_text()],
            )?;
        }
        Ok(())
    }

    /// Fetch a single record by id.
    pub async fn get<R: Record>(&self, id: &str) -> StoreResult<Option<R>> {
        let collection = R::collection_name();
        let conn = self.conn.lock().await;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Fetch a record, erroring if it doesn't exist.
    pub async fn require<R: Record>(&self, id: &str) -> StoreResult<R> {
        self.get(id).await?.ok_or_else(|| StoreError::NotFound {
            collection: R::collection_name(),
            id: id.to_string(),
        })
    }

    /// Delete a record (soft deletes are a field on the record itself; this
    /// is a hard delete used only by tests and migrations).
    pub async fn delete<R: Record>(&self, id: &str) -> StoreResult<()> {
        let collection = R::collection_name();
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        conn.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(())
    }

    /// Return every record in the collection (small collections only — the
    /// composite queries in `obra::persistence` build on top of `query`
    /// rather than scanning whole collections).
    pub async fn all<R: Record>(&self) -> StoreResult<Vec<R>> {
        let collection = R::collection_name();
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT data FROM records WHERE collection = ?1")?;
        let rows = stmt.query_map(params![collection], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Query a collection by ANDing a set of indexed-field filters.
    ///
    /// Each filter narrows the candidate id set via `record_index`; the
    /// final id set is loaded and deserialized. `FilterOp::Eq` is evaluated
    /// in SQL; ordering operators are evaluated in SQL too, comparing the
    /// stored text representation (fine for the `Int`/timestamp fields this
    /// crate indexes, which are fixed-width enough not to need numeric
    /// collation).
    pub async fn query<R: Record>(&self, filters: &[Filter]) -> StoreResult<Vec<R>> {
        let collection = R::collection_name();
        let conn = self.conn.lock().await;

        let mut candidate_ids: Option<std::collections::HashSet<String>> = None;
        for filter in filters {
            let op_sql = match filter.op {
                FilterOp::Eq => "=",
                FilterOp::Ne => "!=",
                FilterOp::Gt => ">",
                FilterOp::Lt => "<",
                FilterOp::Gte => ">=",
                FilterOp::Lte => "<=",
            };
            let sql = format!(
                "SELECT id FROM record_index WHERE collection = ?1 AND field = ?2 AND value {op_sql} ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let ids: std::collections::HashSet<String> = stmt
                .query_map(params![collection, filter.field, filter.value.as_sql_text()], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<_, _>>()?;
            candidate_ids = Some(match candidate_ids {
                Some(existing) => existing.intersection(&ids).cloned().collect(),
                None => ids,
            });
            if candidate_ids.as_ref().is_some_and(|s| s.is_empty()) {
                break;
            }
        }

        let ids: Vec<String> = match candidate_ids {
            Some(ids) => ids.into_iter().collect(),
            None => {
                // No filters: return every record in the collection.
                let mut stmt = conn.prepare("SELECT id FROM records WHERE collection = ?1")?;
                stmt.query_map(params![collection], |row| row.get::<_, String>(0))?
                    .collect::<Result<_, _>>()?
            }
        };

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(json) = data {
                out.push(serde_json::from_str(&json)?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IndexValue;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: String,
        updated_at: i64,
        color: String,
        count: i64,
    }

    impl Record for Widget {
        fn id(&self) -> &str {
            &self.id
        }
        fn updated_at(&self) -> i64 {
            self.updated_at
        }
        fn collection_name() -> &'static str {
            "widgets"
        }
        fn indexed_fields(&self) -> HashMap<String, IndexValue> {
            let mut m = HashMap::new();
            m.insert("color".to_string(), IndexValue::String(self.color.clone()));
            m.insert("count".to_string(), IndexValue::Int(self.count));
            m
        }
    }

    #[tokio::test]
    async fn round_trip_put_get() {
        let store = Store::open_in_memory().await.unwrap();
        let w = Widget {
            id: "w1".into(),
            updated_at: 1,
            color: "red".into(),
            count: 3,
        };
        store.put(&w).await.unwrap();
        let fetched: Widget = store.require("w1").await.unwrap();
        assert_eq!(fetched, w);
    }

    #[tokio::test]
    async fn query_by_indexed_field() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .put(&Widget {
                id: "w1".into(),
                updated_at: 1,
                color: "red".into(),
                count: 1,
            })
            .await
            .unwrap();
        store
            .put(&Widget {
                id: "w2".into(),
                updated_at: 2,
                color: "blue".into(),
                count: 1,
            })
            .await
            .unwrap();

        let reds: Vec<Widget> = store.query(&[Filter::eq("color", IndexValue::String("red".into()))]).await.unwrap();
        assert_eq!(reds.len(), 1);
        assert_eq!(reds[0].id, "w1");
    }

    #[tokio::test]
    async fn update_overwrites_index() {
        let store = Store::open_in_memory().await.unwrap();
        let mut w = Widget {
            id: "w1".into(),
            updated_at: 1,
            color: "red".into(),
            count: 1,
        };
        store.put(&w).await.unwrap();
        w.color = "green".into();
        w.updated_at = 2;
        store.put(&w).await.unwrap();

        let reds: Vec<Widget> = store.query(&[Filter::eq("color", IndexValue::String("red".into()))]).await.unwrap();
        assert!(reds.is_empty());
        let greens: Vec<Widget> = store.query(&[Filter::eq("color", IndexValue::String("green".into()))]).await.unwrap();
        assert_eq!(greens.len(), 1);
    }

    #[tokio::test]
    async fn missing_record_errors() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store.require::<Widget>("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn row_lock_serializes_same_key() {
        let store = Store::open_in_memory().await.unwrap();
        let _guard = store.lock_key("task-1").await;
        // A second lock attempt on a different key must not block.
        let other = tokio::time::timeout(std::time::Duration::from_millis(50), store.lock_key("task-2")).await;
        assert!(other.is_ok());
    }
}
