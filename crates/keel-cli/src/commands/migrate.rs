//! Up and down command implementation

use anyhow::Result;
use keel_core::SchemaRegistry;
use keel_runner::{Direction, Options, Runner};

use crate::cli::{GlobalArgs, MigrateArgs};
use crate::commands::common;

/// Execute the up or down command
pub async fn execute(direction: Direction, args: &MigrateArgs, global: &GlobalArgs) -> Result<()> {
    let config = common::load_config(global)?;
    let root = common::project_root(global);
    let schema_names = common::resolve_schema_names(&args.schemas, &config);

    let factories = common::build_factories(&config, &root, &schema_names)?;
    let runner = Runner::new(SchemaRegistry::builtin(), factories);

    let options = Options {
        direction,
        num_migrations: args.num,
        schema_names,
    };

    log::debug!(
        "Running {direction} migrations for project {} ({})",
        config.name,
        options.schema_names.join(", ")
    );

    let cancel = common::cancel_on_ctrl_c();
    runner.run(&options, &cancel).await?;

    println!(
        "Migrated {} schema(s) {direction}: {}",
        options.schema_names.len(),
        options.schema_names.join(", ")
    );
    Ok(())
}
