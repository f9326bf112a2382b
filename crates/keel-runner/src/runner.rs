//! Migration runner.
//!
//! [`Runner::run`] locks each requested schema, selects the definitions to
//! apply from the schema's current version, and applies them one at a time.
//! [`Runner::validate`] performs the same selection read-only and reports
//! drift between the recorded version and the code's definitions.

use crate::cancel::guarded;
use crate::context::{ContextBuilder, SchemaContext};
use crate::error::{RunnerError, RunnerResult};
use crate::factories::StoreFactories;
use crate::options::{Direction, Options};
use futures::future::join_all;
use keel_core::{Definition, SchemaRegistry};
use keel_db::DbResult;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Version report for one schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaStatus {
    /// Schema name
    pub schema: String,
    /// Recorded version (0 when un-migrated)
    pub version: i32,
    /// Whether the schema is dirty
    pub dirty: bool,
    /// Highest id known to this build (0 when the schema has no definitions)
    pub latest: i32,
    /// Definitions not yet applied; `None` when the recorded version is not
    /// a known definition
    pub pending: Option<usize>,
}

/// Brings schemas to their target version.
pub struct Runner {
    schemas: Arc<SchemaRegistry>,
    factories: StoreFactories,
}

impl Runner {
    /// Create a runner over a schema catalog and the factories that open each
    /// schema's store.
    pub fn new(schemas: Arc<SchemaRegistry>, factories: StoreFactories) -> Self {
        Self { schemas, factories }
    }

    fn contexts(&self) -> ContextBuilder<'_> {
        ContextBuilder::new(&self.schemas, &self.factories)
    }

    /// Apply pending migrations to every schema named in `options`.
    ///
    /// Nothing is locked or applied unless every schema resolves and none is
    /// dirty. Schemas are then processed concurrently and independently; a
    /// failing schema does not interrupt the others.
    pub async fn run(&self, options: &Options, cancel: &CancellationToken) -> RunnerResult<()> {
        let contexts = self.contexts().build(&options.schema_names, cancel).await?;

        let results = join_all(
            contexts
                .iter()
                .map(|context| self.run_schema(options, context, cancel)),
        )
        .await;

        let mut failures: Vec<RunnerError> = results.into_iter().filter_map(Result::err).collect();
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(RunnerError::MultipleSchemasFailed(failures)),
        }
    }

    async fn run_schema(
        &self,
        options: &Options,
        context: &SchemaContext,
        cancel: &CancellationToken,
    ) -> RunnerResult<()> {
        let name = &context.schema.name;

        let locked = match guarded(cancel, name, context.store.lock()).await {
            Ok(locked) => locked,
            Err(cancelled) => {
                // The lock call may have been interrupted after taking the lock.
                return release(name, Err(cancelled), context.store.unlock().await);
            }
        };
        match locked {
            Err(source) => {
                return Err(RunnerError::LockAcquisition {
                    schema: name.clone(),
                    source,
                })
            }
            Ok(false) => {
                return Err(RunnerError::LockNotAcquired {
                    schema: name.clone(),
                })
            }
            Ok(true) => {}
        }

        let result = self.run_locked(options, context, cancel).await;
        release(name, result, context.store.unlock().await)
    }

    async fn run_locked(
        &self,
        options: &Options,
        context: &SchemaContext,
        cancel: &CancellationToken,
    ) -> RunnerResult<()> {
        let schema = &context.schema;
        let name = &schema.name;

        // Re-read under the lock; another runner may have moved the schema
        // since the context was built.
        let state = guarded(cancel, name, context.store.version()).await??;
        if state.dirty {
            return Err(RunnerError::DirtyDatabase {
                schema: name.clone(),
                version: state.version,
            });
        }

        let definitions = match options.direction {
            Direction::Up => {
                log::info!("Upgrading schema {name} from version {}", state.version);
                schema
                    .definitions
                    .up_from(state.version, options.num_migrations)?
            }
            Direction::Down => {
                log::info!("Downgrading schema {name} from version {}", state.version);
                schema
                    .definitions
                    .down_from(state.version, options.num_migrations)?
            }
        };

        for definition in &definitions {
            log::info!(
                "Running {} migration {} ({}) for schema {name}",
                options.direction,
                definition.id,
                definition.name
            );
            self.apply(options.direction, context, definition, cancel)
                .await?;
        }

        let version = match (options.direction, definitions.last()) {
            (_, None) => state.version,
            (Direction::Up, Some(last)) => last.id,
            (Direction::Down, Some(last)) => schema
                .definitions
                .iter()
                .rev()
                .find(|d| d.id < last.id)
                .map_or(0, |d| d.id),
        };
        log::info!(
            "Schema {name} is at version {version} ({} migration(s) applied)",
            definitions.len()
        );
        Ok(())
    }

    async fn apply(
        &self,
        direction: Direction,
        context: &SchemaContext,
        definition: &Definition,
        cancel: &CancellationToken,
    ) -> RunnerResult<()> {
        let name = &context.schema.name;
        let applied = match direction {
            Direction::Up => guarded(cancel, name, context.store.up(definition)).await?,
            Direction::Down => guarded(cancel, name, context.store.down(definition)).await?,
        };
        applied.map_err(|source| RunnerError::MigrationFailed {
            schema: name.clone(),
            id: definition.id,
            direction,
            source,
        })
    }

    /// Check that every named schema has no pending up migrations.
    ///
    /// Never locks and never applies. Stops at the first out-of-date schema.
    pub async fn validate(
        &self,
        schema_names: &[String],
        cancel: &CancellationToken,
    ) -> RunnerResult<()> {
        let contexts = self.contexts().build(schema_names, cancel).await?;
        contexts.iter().try_for_each(validate_schema)
    }

    /// Report recorded and expected versions without locking, applying, or
    /// refusing dirty schemas.
    pub async fn status(
        &self,
        schema_names: &[String],
        cancel: &CancellationToken,
    ) -> RunnerResult<Vec<SchemaStatus>> {
        let resolved = self.contexts().resolve(schema_names, cancel).await?;

        Ok(resolved
            .iter()
            .map(|r| {
                let definitions = &r.schema.definitions;
                SchemaStatus {
                    schema: r.schema.name.clone(),
                    version: r.state.version,
                    dirty: r.state.dirty,
                    latest: definitions.latest().unwrap_or(0),
                    pending: definitions.up_from(r.state.version, 0).ok().map(|p| p.len()),
                }
            })
            .collect())
    }
}

/// Combine the outcome of a locked section with the outcome of releasing the
/// lock. The first error wins; an unlock error surfaces only on success.
fn release(schema: &str, result: RunnerResult<()>, unlocked: DbResult<()>) -> RunnerResult<()> {
    match (result, unlocked) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(source)) => Err(RunnerError::Unlock {
            schema: schema.to_string(),
            source,
        }),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(unlock_err)) => {
            log::warn!("Failed to release lock for schema {schema} after error: {unlock_err}");
            Err(err)
        }
    }
}

fn validate_schema(context: &SchemaContext) -> RunnerResult<()> {
    let schema = &context.schema;
    let definitions = &schema.definitions;

    let (pending, unknown_version) = match definitions.up_from(context.version, 0) {
        Ok(pending) => (pending, false),
        Err(err) => {
            // An unrecognised version usually means the database is ahead of
            // this build. Compare against the full history so the report
            // names a useful expected version.
            match definitions.up_from(0, 0) {
                Ok(all) if !all.is_empty() => (all, true),
                Ok(_) => return Err(err.into()),
                Err(inner) => {
                    log::debug!("Fallback selection for schema {} failed: {inner}", schema.name);
                    return Err(err.into());
                }
            }
        }
    };

    match pending.last() {
        None => {
            log::info!("Schema {} is up to date at version {}", schema.name, context.version);
            Ok(())
        }
        Some(last) => Err(RunnerError::SchemaOutOfDate {
            schema: schema.name.clone(),
            current_version: context.version,
            expected_version: last.id,
            unknown_version,
        }),
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
