//! Status command implementation

use anyhow::Result;
use keel_core::SchemaRegistry;
use keel_runner::{Runner, SchemaStatus};

use crate::cli::{GlobalArgs, StatusArgs};
use crate::commands::common;

/// Execute the status command
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let config = common::load_config(global)?;
    let root = common::project_root(global);
    let schema_names = common::resolve_schema_names(&args.schemas, &config);

    let factories = common::build_factories(&config, &root, &schema_names)?;
    let runner = Runner::new(SchemaRegistry::builtin(), factories);

    let cancel = common::cancel_on_ctrl_c();
    let status = runner.status(&schema_names, &cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", render_table(&status));
    }
    Ok(())
}

fn render_table(status: &[SchemaStatus]) -> String {
    let width = status
        .iter()
        .map(|s| s.schema.len())
        .max()
        .unwrap_or(0)
        .max("SCHEMA".len());

    let mut out = format!(
        "{:<width$}  {:>7}  {:>6}  {:>7}  STATE\n",
        "SCHEMA", "VERSION", "LATEST", "PENDING"
    );
    for s in status {
        let pending = s
            .pending
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string());
        let state = if s.dirty {
            "dirty"
        } else if s.pending.is_none() {
            "unknown version"
        } else if s.pending == Some(0) {
            "up to date"
        } else {
            "pending"
        };
        out.push_str(&format!(
            "{:<width$}  {:>7}  {:>6}  {:>7}  {state}\n",
            s.schema, s.version, s.latest, pending
        ));
    }
    out
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
