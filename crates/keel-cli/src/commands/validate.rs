//! Validate command implementation

use anyhow::Result;
use keel_core::SchemaRegistry;
use keel_runner::Runner;

use crate::cli::{GlobalArgs, ValidateArgs};
use crate::commands::common::{self, ExitCode};

/// Execute the validate command
///
/// Exits with code 1 when any schema is out of date.
pub async fn execute(args: &ValidateArgs, global: &GlobalArgs) -> Result<()> {
    let config = common::load_config(global)?;
    let root = common::project_root(global);
    let schema_names = common::resolve_schema_names(&args.schemas, &config);

    let factories = common::build_factories(&config, &root, &schema_names)?;
    let runner = Runner::new(SchemaRegistry::builtin(), factories);

    let cancel = common::cancel_on_ctrl_c();
    match runner.validate(&schema_names, &cancel).await {
        Ok(()) => {
            println!(
                "Validation passed: {} schema(s) up to date",
                schema_names.len()
            );
            Ok(())
        }
        Err(err) if err.is_drift() => {
            eprintln!("{err}");
            println!("Validation failed: run `keel up` to apply pending migrations");
            Err(ExitCode(1).into())
        }
        Err(err) => Err(err.into()),
    }
}
