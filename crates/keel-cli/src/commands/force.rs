//! Force command implementation

use anyhow::{bail, Result};
use keel_core::SchemaRegistry;
use keel_db::Store;

use crate::cli::{ForceArgs, GlobalArgs};
use crate::commands::common;

/// Execute the force command
///
/// Takes the schema lock, then records `version` as the clean current
/// version. Used after repairing a dirty schema by hand. With
/// `--break-lock`, a lock orphaned by a crashed runner is removed first.
pub async fn execute(args: &ForceArgs, global: &GlobalArgs) -> Result<()> {
    let config = common::load_config(global)?;
    let root = common::project_root(global);

    let registry = SchemaRegistry::builtin();
    let Some(schema) = registry.get(&args.schema) else {
        bail!(
            "Unknown schema \"{}\" (known schemas: {})",
            args.schema,
            registry.names().join(", ")
        );
    };
    if args.version != 0 && schema.definitions.get(args.version).is_none() {
        bail!(
            "Version {} is not a known migration of schema \"{}\"",
            args.version,
            args.schema
        );
    }

    let store = common::open_store(&config, &root, &args.schema)?;
    if args.break_lock && store.break_lock()? {
        println!("Removed stale lock on schema {}", args.schema);
    }
    if !store.lock().await? {
        match store.lock_holder()? {
            Some(holder) => bail!(
                "Failed to acquire lock for schema \"{}\": held by {} since {}. \
                 If that runner is gone, rerun with --break-lock",
                args.schema,
                holder.owner,
                holder.locked_at
            ),
            None => bail!("Failed to acquire lock for schema \"{}\"", args.schema),
        }
    }

    let forced = store.force_version(&schema.definitions, args.version);
    store.unlock().await?;
    forced?;

    println!("Schema {} forced to version {}", args.schema, args.version);
    Ok(())
}
