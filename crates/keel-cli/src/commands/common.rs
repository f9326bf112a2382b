//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use keel_core::config::MEMORY_DB_PATH;
use keel_core::{Config, BUILTIN_SCHEMAS};
use keel_db::{open_connection, DbResult, DuckDbStore, SharedConnection, Store};
use keel_runner::{CancellationToken, StoreFactories};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and open databases are closed.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) u8);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; the command has already reported the failure.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Load keel.yml from `--config` or the project directory.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    match &global.config {
        Some(path) => Config::load(Path::new(path))
            .with_context(|| format!("Failed to load config from {path}")),
        None => Config::load_from_dir(Path::new(&global.project_dir))
            .context("Failed to load project config"),
    }
}

/// Directory that relative database paths resolve against.
pub(crate) fn project_root(global: &GlobalArgs) -> PathBuf {
    PathBuf::from(&global.project_dir)
}

/// Schemas to operate on: the `--schemas` list, else the configured schemas,
/// else every built-in schema.
pub(crate) fn resolve_schema_names(schemas_arg: &Option<String>, config: &Config) -> Vec<String> {
    if let Some(arg) = schemas_arg {
        let names: Vec<String> = arg
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if !names.is_empty() {
            return names;
        }
    }

    let configured = config.schema_names();
    if !configured.is_empty() {
        return configured;
    }

    BUILTIN_SCHEMAS.iter().map(|s| s.to_string()).collect()
}

/// Open one connection per distinct database path used by `schema_names`.
///
/// Keys are the resolved path, or `:memory:`. Schemas sharing a database
/// share the connection, so their stores see the same bookkeeping tables.
pub(crate) fn open_connections(
    config: &Config,
    root: &Path,
    schema_names: &[String],
) -> Result<HashMap<String, SharedConnection>> {
    let mut connections = HashMap::new();
    for name in schema_names {
        let key = connection_key(config, root, name);
        if connections.contains_key(&key) {
            continue;
        }
        log::debug!("Opening database {key} for schema {name}");
        let conn = open_connection(&key)
            .with_context(|| format!("Failed to open database for schema {name}"))?;
        connections.insert(key, conn);
    }
    Ok(connections)
}

fn connection_key(config: &Config, root: &Path, schema: &str) -> String {
    config
        .database_path_absolute(schema, root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| MEMORY_DB_PATH.to_string())
}

/// Register a DuckDB store factory for every name in `schema_names`.
pub(crate) fn build_factories(
    config: &Config,
    root: &Path,
    schema_names: &[String],
) -> Result<StoreFactories> {
    let connections = open_connections(config, root, schema_names)?;

    let mut factories = StoreFactories::new();
    for name in schema_names {
        let key = connection_key(config, root, name);
        let Some(conn) = connections.get(&key) else {
            continue;
        };
        let conn = Arc::clone(conn);
        let schema = name.clone();
        factories = factories.register(name.clone(), move || -> DbResult<Box<dyn Store>> {
            Ok(Box::new(DuckDbStore::with_connection(
                Arc::clone(&conn),
                schema.clone(),
            )?))
        });
    }
    Ok(factories)
}

/// Open the DuckDB store for a single schema.
pub(crate) fn open_store(config: &Config, root: &Path, schema: &str) -> Result<DuckDbStore> {
    let key = connection_key(config, root, schema);
    let conn =
        open_connection(&key).with_context(|| format!("Failed to open database for schema {schema}"))?;
    DuckDbStore::with_connection(conn, schema)
        .with_context(|| format!("Failed to prepare store for schema {schema}"))
}

/// Token cancelled on the first Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, cancelling in-flight migrations");
            token.cancel();
        }
    });
    cancel
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
