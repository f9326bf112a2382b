//! Schema context assembly.
//!
//! Resolves requested schema names into their registry entry, an open store
//! handle, and the version recorded at the start of the invocation. Every
//! schema in a batch is resolved before anything is locked or applied.

use crate::cancel::guarded;
use crate::error::{RunnerError, RunnerResult};
use crate::factories::StoreFactories;
use keel_core::{Schema, SchemaRegistry};
use keel_db::{Store, VersionState};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-invocation binding of a schema, its store, and its starting version.
pub struct SchemaContext {
    /// Registry entry
    pub schema: Arc<Schema>,
    /// Open store handle bound to this schema
    pub store: Box<dyn Store>,
    /// Version recorded when the context was built
    pub version: i32,
}

/// A resolved schema whose state has not been checked for dirtiness.
pub struct ResolvedSchema {
    pub schema: Arc<Schema>,
    pub store: Box<dyn Store>,
    pub state: VersionState,
}

/// Builds [`SchemaContext`]s from schema names.
pub struct ContextBuilder<'a> {
    schemas: &'a SchemaRegistry,
    factories: &'a StoreFactories,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(schemas: &'a SchemaRegistry, factories: &'a StoreFactories) -> Self {
        Self { schemas, factories }
    }

    /// Resolve `names` into contexts, refusing the whole batch if any schema
    /// is dirty.
    pub async fn build(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> RunnerResult<Vec<SchemaContext>> {
        let resolved = self.resolve(names, cancel).await?;

        if let Some(dirty) = resolved.iter().find(|r| r.state.dirty) {
            return Err(RunnerError::DirtyDatabase {
                schema: dirty.schema.name.clone(),
                version: dirty.state.version,
            });
        }

        Ok(resolved
            .into_iter()
            .map(|r| SchemaContext {
                schema: r.schema,
                store: r.store,
                version: r.state.version,
            })
            .collect())
    }

    /// Resolve `names` into schemas, stores and version states without
    /// judging the states.
    pub async fn resolve(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> RunnerResult<Vec<ResolvedSchema>> {
        let names = unique_names(names);

        let schemas = self.resolve_schemas(&names)?;
        let stores = self.resolve_stores(&names, cancel).await?;
        let states = fetch_versions(&names, &stores, cancel).await?;

        Ok(schemas
            .into_iter()
            .zip(stores)
            .zip(states)
            .map(|((schema, store), state)| ResolvedSchema {
                schema,
                store,
                state,
            })
            .collect())
    }

    fn resolve_schemas(&self, names: &[&str]) -> RunnerResult<Vec<Arc<Schema>>> {
        names
            .iter()
            .map(|name| {
                self.schemas
                    .get(name)
                    .ok_or_else(|| RunnerError::UnknownSchema {
                        name: name.to_string(),
                    })
            })
            .collect()
    }

    async fn resolve_stores(
        &self,
        names: &[&str],
        cancel: &CancellationToken,
    ) -> RunnerResult<Vec<Box<dyn Store>>> {
        let mut stores = Vec::with_capacity(names.len());
        for name in names {
            let Some(factory) = self.factories.get(name) else {
                log::debug!(
                    "No store factory for schema {} (registered: {})",
                    name,
                    self.factories.names().join(", ")
                );
                return Err(RunnerError::UnknownSchema {
                    name: name.to_string(),
                });
            };
            let store = guarded(cancel, name, factory.open()).await??;
            log::debug!("Opened {} store for schema {}", store.store_type(), name);
            stores.push(store);
        }
        Ok(stores)
    }
}

async fn fetch_versions(
    names: &[&str],
    stores: &[Box<dyn Store>],
    cancel: &CancellationToken,
) -> RunnerResult<Vec<VersionState>> {
    let mut states = Vec::with_capacity(stores.len());
    for (name, store) in names.iter().zip(stores) {
        let state = guarded(cancel, name, store.version()).await??;
        log::info!(
            "Checked current version of schema {}: version {}, dirty {}",
            name,
            state.version,
            state.dirty
        );
        states.push(state);
    }
    Ok(states)
}

/// Requested names with repeats dropped, first occurrence kept.
fn unique_names(names: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect()
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
