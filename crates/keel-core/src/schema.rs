//! Schemas and the schema registry.
//!
//! A [`Schema`] is an independently versioned unit with its own migration
//! history. The [`SchemaRegistry`] is the immutable catalog of every schema
//! this build knows about; it is assembled once and shared read-only.

use crate::definition::Definitions;
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named schema and its ordered migration definitions.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Unique schema name
    pub name: String,
    /// Migration history, ascending by id
    pub definitions: Definitions,
}

impl Schema {
    /// Create a schema. The definitions must have been built for the same name.
    pub fn new(definitions: Definitions) -> Self {
        Self {
            name: definitions.schema().to_string(),
            definitions,
        }
    }
}

/// Immutable catalog of schemas keyed by name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Build a registry, rejecting duplicate names.
    pub fn new(schemas: impl IntoIterator<Item = Schema>) -> CoreResult<Self> {
        let mut map = BTreeMap::new();
        for schema in schemas {
            let name = schema.name.clone();
            if map.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(CoreError::DuplicateSchema { name });
            }
        }
        Ok(Self { schemas: map })
    }

    /// The static catalog compiled into this binary.
    pub fn builtin() -> Arc<SchemaRegistry> {
        crate::catalog::builtin()
    }

    /// Look up a schema by name.
    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).cloned()
    }

    /// Registered schema names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    /// Iterate registered schemas in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// True if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod tests;
