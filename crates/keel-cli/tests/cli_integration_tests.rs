//! Integration tests for the keel binary
//!
//! Each test writes a keel.yml into a temporary project directory and drives
//! the compiled binary against an on-disk DuckDB database there.

use keel_db::{DuckDbStore, Store};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Path to the compiled keel binary
fn keel_bin() -> String {
    env!("CARGO_BIN_EXE_keel").to_string()
}

/// Run `keel -p <project>` with `args`; returns (stdout, stderr, exit code).
fn run_keel(project: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(keel_bin())
        .arg("-p")
        .arg(project)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to execute keel with args {:?}: {}", args, e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

fn project(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("keel.yml"), config).unwrap();
    dir
}

fn default_project() -> TempDir {
    project(
        r#"
name: keel_cli_test
database:
  path: app.duckdb
"#,
    )
}

fn status_json(project: &Path, schemas: &str) -> serde_json::Value {
    let (stdout, stderr, code) = run_keel(project, &["status", "--json", "-s", schemas]);
    assert_eq!(code, 0, "status failed: {stderr}");
    serde_json::from_str(&stdout).unwrap()
}

// ── Tests ──────────────────────────────────────────────────────────────

#[test]
fn test_up_then_validate() {
    let dir = default_project();

    let (stdout, stderr, code) = run_keel(dir.path(), &["up"]);
    assert_eq!(code, 0, "up failed: {stderr}");
    assert!(stdout.contains("Migrated 3 schema(s) up"));
    assert!(dir.path().join("app.duckdb").exists());

    let (stdout, _, code) = run_keel(dir.path(), &["validate"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Validation passed"));
}

#[test]
fn test_validate_reports_drift_with_exit_code() {
    let dir = default_project();

    let (_, stderr, code) = run_keel(dir.path(), &["up", "-s", "frontend", "-n", "1"]);
    assert_eq!(code, 0, "up failed: {stderr}");

    let (_, stderr, code) = run_keel(dir.path(), &["validate", "-s", "frontend"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("[R008]"), "stderr: {stderr}");
    assert!(stderr.contains("current version 1, expected version 3"));
}

#[test]
fn test_status_json_after_partial_down() {
    let dir = default_project();

    let (_, stderr, code) = run_keel(dir.path(), &["up", "-s", "frontend,codeintel"]);
    assert_eq!(code, 0, "up failed: {stderr}");
    let (_, stderr, code) = run_keel(dir.path(), &["down", "-s", "frontend", "-n", "2"]);
    assert_eq!(code, 0, "down failed: {stderr}");

    let status = status_json(dir.path(), "frontend,codeintel");
    assert_eq!(status[0]["schema"], "frontend");
    assert_eq!(status[0]["version"], 1);
    assert_eq!(status[0]["pending"], 2);
    assert_eq!(status[1]["schema"], "codeintel");
    assert_eq!(status[1]["version"], 2);
    assert_eq!(status[1]["pending"], 0);
}

#[test]
fn test_configured_schemas_are_default_set() {
    let dir = project(
        r#"
name: keel_cli_test
database:
  path: app.duckdb
schemas:
  codeinsights:
    path: insights.duckdb
"#,
    );

    let (stdout, stderr, code) = run_keel(dir.path(), &["up"]);
    assert_eq!(code, 0, "up failed: {stderr}");
    assert!(stdout.contains("Migrated 1 schema(s) up: codeinsights"));
    assert!(dir.path().join("insights.duckdb").exists());
    assert!(!dir.path().join("app.duckdb").exists());
}

#[test]
fn test_unknown_schema_fails() {
    let dir = default_project();

    let (_, stderr, code) = run_keel(dir.path(), &["up", "-s", "billing"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("[R001]"), "stderr: {stderr}");
}

#[test]
fn test_missing_config_fails() {
    let dir = TempDir::new().unwrap();

    let (_, stderr, code) = run_keel(dir.path(), &["status"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Failed to load project config"));
}

#[test]
fn test_force_rejects_unknown_version() {
    let dir = default_project();

    let (_, stderr, code) = run_keel(dir.path(), &["force", "codeintel", "42"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not a known migration"));
}

#[test]
fn test_force_unknown_schema_lists_known_schemas() {
    let dir = default_project();

    let (_, stderr, code) = run_keel(dir.path(), &["force", "billing", "0"]);
    assert_ne!(code, 0);
    assert!(
        stderr.contains("known schemas: codeinsights, codeintel, frontend"),
        "stderr: {stderr}"
    );
}

#[test]
fn test_force_rewrites_version() {
    let dir = default_project();

    let (_, stderr, code) = run_keel(dir.path(), &["up", "-s", "frontend", "-n", "2"]);
    assert_eq!(code, 0, "up failed: {stderr}");

    let (stdout, stderr, code) = run_keel(dir.path(), &["force", "frontend", "2"]);
    assert_eq!(code, 0, "force failed: {stderr}");
    assert!(stdout.contains("forced to version 2"));

    let status = status_json(dir.path(), "frontend");
    assert_eq!(status[0]["version"], 2);
    assert_eq!(status[0]["dirty"], false);

    // Steps below the forced version stay recorded and revert one at a time
    let (_, stderr, code) = run_keel(dir.path(), &["down", "-s", "frontend", "-n", "1"]);
    assert_eq!(code, 0, "down failed: {stderr}");
    assert_eq!(status_json(dir.path(), "frontend")[0]["version"], 1);

    let (_, stderr, code) = run_keel(dir.path(), &["up", "-s", "frontend"]);
    assert_eq!(code, 0, "up after force failed: {stderr}");
    let (_, stderr, code) = run_keel(dir.path(), &["validate", "-s", "frontend"]);
    assert_eq!(code, 0, "validate failed: {stderr}");
}

#[tokio::test]
async fn test_force_breaks_orphaned_lock() {
    let dir = default_project();
    let db_path = dir.path().join("app.duckdb");

    {
        // Runner that exited without unlocking
        let crashed = DuckDbStore::open(&db_path, "codeintel").unwrap();
        assert!(crashed.lock().await.unwrap());
    }

    let (_, stderr, code) = run_keel(dir.path(), &["force", "codeintel", "0"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--break-lock"), "stderr: {stderr}");

    let (stdout, stderr, code) =
        run_keel(dir.path(), &["force", "codeintel", "0", "--break-lock"]);
    assert_eq!(code, 0, "force failed: {stderr}");
    assert!(stdout.contains("Removed stale lock on schema codeintel"));

    let (_, stderr, code) = run_keel(dir.path(), &["up", "-s", "codeintel"]);
    assert_eq!(code, 0, "up failed: {stderr}");
}
