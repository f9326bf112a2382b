//! Integration tests for the runner against real DuckDB stores.
//!
//! Every schema shares one connection, the way the CLI wires a project whose
//! schemas live in the same database file.

use keel_core::{Definition, Definitions, Schema, SchemaRegistry, BUILTIN_SCHEMAS};
use keel_db::{open_connection, DbResult, DuckDbStore, SharedConnection, Store};
use keel_runner::{CancellationToken, Options, Runner, RunnerError, StoreFactories};
use std::sync::Arc;

// ── Helpers ────────────────────────────────────────────────────────────

fn factories(conn: &SharedConnection, names: &[&str]) -> StoreFactories {
    names.iter().fold(StoreFactories::new(), |factories, name| {
        let conn = Arc::clone(conn);
        let schema = name.to_string();
        factories.register(*name, move || -> DbResult<Box<dyn Store>> {
            Ok(Box::new(DuckDbStore::with_connection(
                Arc::clone(&conn),
                schema.clone(),
            )?))
        })
    })
}

fn builtin_runner(conn: &SharedConnection) -> Runner {
    Runner::new(SchemaRegistry::builtin(), factories(conn, BUILTIN_SCHEMAS))
}

fn table_exists(conn: &SharedConnection, table: &str) -> bool {
    let conn = conn.lock().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            duckdb::params![table],
            |row| row.get(0),
        )
        .unwrap();
    count > 0
}

async fn version_of(conn: &SharedConnection, schema: &str) -> (i32, bool) {
    let store = DuckDbStore::with_connection(Arc::clone(conn), schema).unwrap();
    let state = store.version().await.unwrap();
    (state.version, state.dirty)
}

/// Registry with one schema whose second migration cannot execute.
fn broken_registry() -> Arc<SchemaRegistry> {
    let defs = Definitions::new(
        "ledger",
        vec![
            Definition::new(
                1,
                "accounts",
                "CREATE TABLE accounts (id INTEGER PRIMARY KEY);",
                "DROP TABLE accounts;",
            ),
            Definition::new(
                2,
                "entries",
                "CREATE TABEL entries (account_id INTEGER);",
                "DROP TABLE entries;",
            ),
        ],
    )
    .unwrap();
    Arc::new(SchemaRegistry::new(vec![Schema::new(defs)]).unwrap())
}

// ── Tests ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_builtin_schemas_migrate_to_latest() {
    let conn = open_connection(":memory:").unwrap();
    let runner = builtin_runner(&conn);
    let cancel = CancellationToken::new();

    runner
        .run(&Options::up(BUILTIN_SCHEMAS.iter().copied()), &cancel)
        .await
        .unwrap();

    let registry = SchemaRegistry::builtin();
    for name in BUILTIN_SCHEMAS {
        let latest = registry.get(name).unwrap().definitions.latest().unwrap();
        assert_eq!(version_of(&conn, name).await, (latest, false), "{name}");
    }
    assert!(table_exists(&conn, "users"));
    assert!(table_exists(&conn, "executor_heartbeats"));
    assert!(table_exists(&conn, "lsif_data_documents"));
    assert!(table_exists(&conn, "dashboards"));

    let names: Vec<String> = BUILTIN_SCHEMAS.iter().map(|s| s.to_string()).collect();
    runner.validate(&names, &cancel).await.unwrap();
}

#[tokio::test]
async fn test_down_removes_objects_and_record() {
    let conn = open_connection(":memory:").unwrap();
    let runner = builtin_runner(&conn);
    let cancel = CancellationToken::new();

    runner.run(&Options::up(["frontend"]), &cancel).await.unwrap();
    runner
        .run(&Options::down(["frontend"]).limit(1), &cancel)
        .await
        .unwrap();

    assert_eq!(version_of(&conn, "frontend").await, (2, false));
    assert!(!table_exists(&conn, "executor_heartbeats"));
    assert!(table_exists(&conn, "user_emails"));

    runner.run(&Options::down(["frontend"]), &cancel).await.unwrap();

    assert_eq!(version_of(&conn, "frontend").await, (0, false));
    assert!(!table_exists(&conn, "users"));
}

#[tokio::test]
async fn test_validate_reports_partial_migration() {
    let conn = open_connection(":memory:").unwrap();
    let runner = builtin_runner(&conn);
    let cancel = CancellationToken::new();

    runner
        .run(&Options::up(["frontend"]).limit(2), &cancel)
        .await
        .unwrap();

    let err = runner
        .validate(&["frontend".to_string()], &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RunnerError::SchemaOutOfDate {
            current_version: 2,
            expected_version: 3,
            unknown_version: false,
            ..
        }
    ));
    // Validation leaves no trace
    assert_eq!(version_of(&conn, "frontend").await, (2, false));
    assert!(!table_exists(&conn, "executor_heartbeats"));
}

#[tokio::test]
async fn test_failed_migration_leaves_schema_dirty() {
    let conn = open_connection(":memory:").unwrap();
    let runner = Runner::new(broken_registry(), factories(&conn, &["ledger"]));
    let cancel = CancellationToken::new();

    let err = runner.run(&Options::up(["ledger"]), &cancel).await.unwrap_err();
    assert!(matches!(err, RunnerError::MigrationFailed { id: 2, .. }));
    assert!(table_exists(&conn, "accounts"));
    assert!(!table_exists(&conn, "entries"));
    assert_eq!(version_of(&conn, "ledger").await, (2, true));

    // Nothing proceeds until an operator intervenes
    let err = runner.run(&Options::up(["ledger"]), &cancel).await.unwrap_err();
    assert!(err.is_dirty());
    let err = runner
        .validate(&["ledger".to_string()], &cancel)
        .await
        .unwrap_err();
    assert!(err.is_dirty());

    // Forcing back to the last good version makes the schema runnable again
    let registry = broken_registry();
    DuckDbStore::with_connection(Arc::clone(&conn), "ledger")
        .unwrap()
        .force_version(&registry.get("ledger").unwrap().definitions, 1)
        .unwrap();
    assert_eq!(version_of(&conn, "ledger").await, (1, false));

    let err = runner
        .validate(&["ledger".to_string()], &cancel)
        .await
        .unwrap_err();
    assert!(err.is_drift());

    // The forced record reverts like any applied step
    runner.run(&Options::down(["ledger"]).limit(1), &cancel).await.unwrap();
    assert_eq!(version_of(&conn, "ledger").await, (0, false));
    assert!(!table_exists(&conn, "accounts"));
}

#[tokio::test]
async fn test_force_keeps_earlier_steps_revertible() {
    let conn = open_connection(":memory:").unwrap();
    let runner = builtin_runner(&conn);
    let cancel = CancellationToken::new();

    runner.run(&Options::up(["frontend"]).limit(2), &cancel).await.unwrap();

    let registry = SchemaRegistry::builtin();
    DuckDbStore::with_connection(Arc::clone(&conn), "frontend")
        .unwrap()
        .force_version(&registry.get("frontend").unwrap().definitions, 2)
        .unwrap();

    runner
        .run(&Options::down(["frontend"]).limit(1), &cancel)
        .await
        .unwrap();
    assert_eq!(version_of(&conn, "frontend").await, (1, false));
    assert!(table_exists(&conn, "users"));
    assert!(!table_exists(&conn, "user_emails"));

    runner.run(&Options::up(["frontend"]), &cancel).await.unwrap();
    assert_eq!(version_of(&conn, "frontend").await, (3, false));
}

#[tokio::test]
async fn test_lock_held_by_other_runner() {
    let conn = open_connection(":memory:").unwrap();
    let holder = DuckDbStore::with_connection(Arc::clone(&conn), "codeintel").unwrap();
    assert!(holder.lock().await.unwrap());

    let runner = builtin_runner(&conn);
    let cancel = CancellationToken::new();

    let err = runner
        .run(&Options::up(["codeintel"]), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::LockNotAcquired { .. }));
    assert_eq!(version_of(&conn, "codeintel").await, (0, false));

    // Other schemas are unaffected by the held lock
    runner
        .run(&Options::up(["codeinsights"]), &cancel)
        .await
        .unwrap();

    holder.unlock().await.unwrap();
    runner
        .run(&Options::up(["codeintel"]), &cancel)
        .await
        .unwrap();
    assert_eq!(version_of(&conn, "codeintel").await, (2, false));
}

#[tokio::test]
async fn test_state_persists_across_connections() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("keel.duckdb");
    let path = path.to_str().unwrap();
    let cancel = CancellationToken::new();

    {
        let conn = open_connection(path).unwrap();
        builtin_runner(&conn)
            .run(&Options::up(["codeinsights"]).limit(1), &cancel)
            .await
            .unwrap();
    }

    let conn = open_connection(path).unwrap();
    assert_eq!(version_of(&conn, "codeinsights").await, (1, false));

    let status = builtin_runner(&conn)
        .status(&["codeinsights".to_string()], &cancel)
        .await
        .unwrap();
    assert_eq!(status[0].version, 1);
    assert_eq!(status[0].latest, 2);
    assert_eq!(status[0].pending, Some(1));
}
