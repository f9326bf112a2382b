//! DuckDB migration store implementation
//!
//! Version state and locks live in the `keel_meta` schema of the target
//! database. Several schemas, and several handles for the same schema, may
//! share one connection; each handle carries its own lock owner id.

use crate::error::{DbError, DbResult};
use crate::traits::{Store, VersionState};
use async_trait::async_trait;
use duckdb::Connection;
use keel_core::{Definition, Definitions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Shared handle to a DuckDB connection.
pub type SharedConnection = Arc<Mutex<Connection>>;

const BOOKKEEPING_DDL: &str = "
CREATE SCHEMA IF NOT EXISTS keel_meta;
CREATE TABLE IF NOT EXISTS keel_meta.schema_migrations (
    schema_name VARCHAR   NOT NULL,
    version     INTEGER   NOT NULL,
    dirty       BOOLEAN   NOT NULL DEFAULT false,
    applied_at  TIMESTAMP NOT NULL DEFAULT now(),
    PRIMARY KEY (schema_name, version)
);
CREATE TABLE IF NOT EXISTS keel_meta.migration_locks (
    schema_name VARCHAR   PRIMARY KEY,
    owner       VARCHAR   NOT NULL,
    locked_at   TIMESTAMP NOT NULL DEFAULT now()
);";

/// Open a DuckDB connection from a path string (handles `:memory:`).
pub fn open_connection(path: &str) -> DbResult<SharedConnection> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(Path::new(path))
    }
    .map_err(|e| DbError::ConnectionError(format!("{e}: {path}")))?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Current holder of a schema lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    /// Owner id of the handle that took the lock
    pub owner: String,
    /// When the lock was taken
    pub locked_at: String,
}

/// DuckDB-backed migration store for one schema
pub struct DuckDbStore {
    conn: SharedConnection,
    schema: String,
    owner: String,
    held: AtomicBool,
}

impl DuckDbStore {
    /// Bind a store for `schema` to an existing connection.
    ///
    /// Creates the bookkeeping tables if they do not exist.
    pub fn with_connection(conn: SharedConnection, schema: impl Into<String>) -> DbResult<Self> {
        {
            let guard = conn.lock()?;
            guard.execute_batch(BOOKKEEPING_DDL).map_err(|e| {
                DbError::ExecutionError(format!("failed to create keel_meta tables: {e}"))
            })?;
        }
        Ok(Self {
            conn,
            schema: schema.into(),
            owner: Uuid::new_v4().to_string(),
            held: AtomicBool::new(false),
        })
    }

    /// Open (or create) a database file and bind a store for `schema`.
    pub fn open(path: &Path, schema: impl Into<String>) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Self::with_connection(Arc::new(Mutex::new(conn)), schema)
    }

    /// Create a store over a fresh in-memory database.
    pub fn in_memory(schema: impl Into<String>) -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Self::with_connection(Arc::new(Mutex::new(conn)), schema)
    }

    /// Schema this store is bound to.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Shared connection, for callers that need to inspect migrated objects.
    pub fn connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }

    /// Record `version` as the clean current version.
    ///
    /// Operator escape hatch for a dirty schema once its structure has been
    /// repaired by hand. Rows above `version` are removed and every known
    /// definition up to it is recorded as applied, so later down steps revert
    /// one definition at a time. A version of 0 erases the record entirely.
    pub fn force_version(&self, definitions: &Definitions, version: i32) -> DbResult<()> {
        if definitions.schema() != self.schema {
            return Err(DbError::InvalidVersion(format!(
                "definitions for schema {} cannot force schema {}",
                definitions.schema(),
                self.schema
            )));
        }
        if version != 0 && definitions.get(version).is_none() {
            return Err(DbError::InvalidVersion(format!(
                "{version} is not a known migration of schema {}",
                self.schema
            )));
        }

        let conn = self.conn.lock()?;
        transaction(&conn, |conn| {
            conn.execute(
                "DELETE FROM keel_meta.schema_migrations WHERE schema_name = ? AND version > ?",
                duckdb::params![self.schema, version],
            )?;
            for definition in definitions.iter().take_while(|d| d.id <= version) {
                conn.execute(
                    "INSERT INTO keel_meta.schema_migrations (schema_name, version) VALUES (?, ?)
                     ON CONFLICT DO NOTHING",
                    duckdb::params![self.schema, definition.id],
                )?;
            }
            conn.execute(
                "UPDATE keel_meta.schema_migrations SET dirty = false
                 WHERE schema_name = ? AND dirty",
                duckdb::params![self.schema],
            )?;
            Ok(())
        })?;
        log::info!("Forced schema {} to version {}", self.schema, version);
        Ok(())
    }

    /// Owner and acquisition time of the schema's lock row, if one exists.
    pub fn lock_holder(&self) -> DbResult<Option<LockHolder>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT owner, CAST(locked_at AS VARCHAR) FROM keel_meta.migration_locks
             WHERE schema_name = ?",
        )?;
        let mut rows = stmt.query(duckdb::params![self.schema])?;
        let holder = match rows.next()? {
            Some(row) => Some(LockHolder {
                owner: row.get(0)?,
                locked_at: row.get(1)?,
            }),
            None => None,
        };
        Ok(holder)
    }

    /// Remove the schema's lock row regardless of owner.
    ///
    /// Recovers a lock left behind by a process that exited without
    /// unlocking. Returns whether a row was removed.
    pub fn break_lock(&self) -> DbResult<bool> {
        let holder = self.lock_holder()?;
        let conn = self.conn.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM keel_meta.migration_locks WHERE schema_name = ?",
                duckdb::params![self.schema],
            )
            .map_err(|e| DbError::ExecutionError(format!("failed to break lock: {e}")))?;
        self.held.store(false, Ordering::SeqCst);

        if let Some(holder) = holder {
            log::warn!(
                "Broke lock on schema {} held by {} since {}",
                self.schema,
                holder.owner,
                holder.locked_at
            );
        }
        Ok(removed > 0)
    }

    fn version_sync(&self) -> DbResult<VersionState> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT version, dirty FROM keel_meta.schema_migrations
             WHERE schema_name = ? ORDER BY version DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(duckdb::params![self.schema])?;
        let state = match rows.next()? {
            Some(row) => VersionState {
                version: row.get(0)?,
                dirty: row.get(1)?,
                exists: true,
            },
            None => VersionState::unmigrated(),
        };
        Ok(state)
    }

    fn lock_sync(&self) -> DbResult<bool> {
        if self.held.load(Ordering::SeqCst) {
            return Ok(true);
        }
        let conn = self.conn.lock()?;
        let inserted = conn
            .execute(
                "INSERT INTO keel_meta.migration_locks (schema_name, owner) VALUES (?, ?)
                 ON CONFLICT DO NOTHING",
                duckdb::params![self.schema, self.owner],
            )
            .map_err(|e| DbError::ExecutionError(format!("failed to take lock: {e}")))?;
        let acquired = inserted == 1;
        self.held.store(acquired, Ordering::SeqCst);
        Ok(acquired)
    }

    fn unlock_sync(&self) -> DbResult<()> {
        if !self.held.load(Ordering::SeqCst) {
            return Ok(());
        }
        let conn = self.conn.lock()?;
        conn.execute(
            "DELETE FROM keel_meta.migration_locks WHERE schema_name = ? AND owner = ?",
            duckdb::params![self.schema, self.owner],
        )
        .map_err(|e| DbError::ExecutionError(format!("failed to release lock: {e}")))?;
        self.held.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn up_sync(&self, definition: &Definition) -> DbResult<()> {
        let conn = self.conn.lock()?;

        // Recorded dirty first so an interrupted step stays visible.
        conn.execute(
            "INSERT INTO keel_meta.schema_migrations (schema_name, version, dirty) VALUES (?, ?, true)",
            duckdb::params![self.schema, definition.id],
        )?;

        transaction(&conn, |conn| {
            conn.execute_batch(&definition.up).map_err(|e| {
                DbError::ExecutionError(format!("migration {} up: {e}", definition.id))
            })?;
            conn.execute(
                "UPDATE keel_meta.schema_migrations SET dirty = false WHERE schema_name = ? AND version = ?",
                duckdb::params![self.schema, definition.id],
            )?;
            Ok(())
        })
    }

    fn down_sync(&self, definition: &Definition) -> DbResult<()> {
        let conn = self.conn.lock()?;

        conn.execute(
            "UPDATE keel_meta.schema_migrations SET dirty = true WHERE schema_name = ? AND version = ?",
            duckdb::params![self.schema, definition.id],
        )?;

        transaction(&conn, |conn| {
            conn.execute_batch(&definition.down).map_err(|e| {
                DbError::ExecutionError(format!("migration {} down: {e}", definition.id))
            })?;
            conn.execute(
                "DELETE FROM keel_meta.schema_migrations WHERE schema_name = ? AND version = ?",
                duckdb::params![self.schema, definition.id],
            )?;
            Ok(())
        })
    }
}

/// Execute `body` within a `BEGIN` / `COMMIT` transaction, rolling back on
/// error.
fn transaction<F, T>(conn: &Connection, body: F) -> DbResult<T>
where
    F: FnOnce(&Connection) -> DbResult<T>,
{
    conn.execute_batch("BEGIN TRANSACTION")
        .map_err(|e| DbError::TransactionError(format!("BEGIN failed: {e}")))?;

    let result = body(conn);

    match &result {
        Ok(_) => {
            if let Err(commit_err) = conn.execute_batch("COMMIT") {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(DbError::TransactionError(format!(
                    "COMMIT failed: {commit_err}"
                )));
            }
        }
        Err(_) => {
            let _ = conn.execute_batch("ROLLBACK");
        }
    }
    result
}

#[async_trait]
impl Store for DuckDbStore {
    async fn version(&self) -> DbResult<VersionState> {
        self.version_sync()
    }

    async fn lock(&self) -> DbResult<bool> {
        self.lock_sync()
    }

    async fn unlock(&self) -> DbResult<()> {
        self.unlock_sync()
    }

    async fn up(&self, definition: &Definition) -> DbResult<()> {
        self.up_sync(definition)
    }

    async fn down(&self, definition: &Definition) -> DbResult<()> {
        self.down_sync(definition)
    }

    fn store_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
