//! Ordered, idempotent schema migrations.
//!
//! Each migration is identified by a monotonic integer and applied inside a
//! single transaction. `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT
//! EXISTS` make every migration safe to re-run, so applying migrations
//! `0..=N` from scratch produces the same schema as applying them
//! incrementally from any earlier version.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// One migration step: a version number and the SQL to reach it.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "schema_meta + records + record_index tables",
        sql: "
            CREATE TABLE IF NOT EXISTS schema_meta (
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection_updated
                ON records (collection, updated_at);

            CREATE TABLE IF NOT EXISTS record_index (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_record_index_lookup
                ON record_index (collection, field, value);

            CREATE INDEX IF NOT EXISTS idx_record_index_by_id
                ON record_index (collection, id);
        ",
    },
    Migration {
        version: 2,
        description: "retry_attempts table for crash-recoverable backoff state",
        sql: "
            CREATE TABLE IF NOT EXISTS retry_attempts (
                task_id TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                error_class TEXT NOT NULL,
                occurred_at INTEGER NOT NULL,
                next_retry_at INTEGER NOT NULL,
                PRIMARY KEY (task_id, attempt)
            );
        ",
    },
];

/// Apply every migration newer than the schema's current version.
pub fn run_migrations(conn: &mut Connection) -> StoreResult<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL)")?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_meta", [], |row| row.get(0))
        .unwrap_or(0);
    debug!(current_version = current, "run_migrations: starting");

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        info!(version = migration.version, desc = migration.description, "applying migration");
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| StoreError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;
        tx.execute("INSERT INTO schema_meta (version) VALUES (?1)", [migration.version])?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_and_incremental_migration_converge() {
        let mut fresh = Connection::open_in_memory().unwrap();
        run_migrations(&mut fresh).unwrap();

        let mut incremental = Connection::open_in_memory().unwrap();
        run_migrations(&mut incremental).unwrap();
        // Re-running is a no-op (idempotent).
        run_migrations(&mut incremental).unwrap();

        let fresh_version: u32 = fresh
            .query_row("SELECT MAX(version) FROM schema_meta", [], |r| r.get(0))
            .unwrap();
        let incremental_version: u32 = incremental
            .query_row("SELECT MAX(version) FROM schema_meta", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fresh_version, incremental_version);
    }
}
