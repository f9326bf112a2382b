//! Migration definitions and ordered definition sets.

use crate::error::{CoreError, CoreResult};

/// A single migration step.
///
/// The `up` and `down` bodies are opaque to the runner; the store that
/// receives the definition decides how to execute them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Sequential identifier, unique and strictly positive within a schema
    pub id: i32,
    /// Short human-readable label
    pub name: String,
    /// Body that applies this step
    pub up: String,
    /// Body that reverts this step
    pub down: String,
}

impl Definition {
    /// Create a definition from its parts.
    pub fn new(
        id: i32,
        name: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            up: up.into(),
            down: down.into(),
        }
    }
}

/// Ordered set of definitions belonging to one schema.
///
/// Ids are strictly ascending. Gaps are allowed.
#[derive(Debug, Clone)]
pub struct Definitions {
    schema: String,
    definitions: Vec<Definition>,
}

impl Definitions {
    /// Build a definition set for `schema`, rejecting non-positive or
    /// out-of-order ids.
    pub fn new(schema: impl Into<String>, definitions: Vec<Definition>) -> CoreResult<Self> {
        let schema = schema.into();

        if let Some(bad) = definitions.iter().find(|d| d.id <= 0) {
            return Err(CoreError::InvalidDefinitions {
                schema,
                message: format!("migration id {} must be positive", bad.id),
            });
        }

        if let Some(pair) = definitions.windows(2).find(|w| w[0].id >= w[1].id) {
            return Err(CoreError::InvalidDefinitions {
                schema,
                message: format!(
                    "migration ids must be strictly ascending, found {} followed by {}",
                    pair[0].id, pair[1].id
                ),
            });
        }

        Ok(Self {
            schema,
            definitions,
        })
    }

    /// Name of the schema these definitions belong to.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True if there are no definitions.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Iterate definitions in ascending id order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Definition> {
        self.definitions.iter()
    }

    /// Look up a definition by id.
    pub fn get(&self, id: i32) -> Option<&Definition> {
        self.definitions
            .binary_search_by_key(&id, |d| d.id)
            .ok()
            .map(|idx| &self.definitions[idx])
    }

    /// Highest known id, if any.
    pub fn latest(&self) -> Option<i32> {
        self.definitions.last().map(|d| d.id)
    }

    /// Definitions to apply to move up from `version`, ascending.
    ///
    /// A `limit` of 0 means no cap. Fails if `version` is non-zero and not a
    /// known id.
    pub fn up_from(&self, version: i32, limit: usize) -> CoreResult<Vec<&Definition>> {
        self.check_version(version)?;

        let pending = self.definitions.iter().filter(|d| d.id > version);
        Ok(cap(pending, limit))
    }

    /// Definitions to revert to move down from `version`, descending.
    ///
    /// A `limit` of 0 means every applied definition. Fails if `version` is
    /// non-zero and not a known id.
    pub fn down_from(&self, version: i32, limit: usize) -> CoreResult<Vec<&Definition>> {
        self.check_version(version)?;

        let applied = self.definitions.iter().rev().filter(|d| d.id <= version);
        Ok(cap(applied, limit))
    }

    fn check_version(&self, version: i32) -> CoreResult<()> {
        if version == 0 || self.get(version).is_some() {
            Ok(())
        } else {
            Err(CoreError::UnknownVersion {
                schema: self.schema.clone(),
                version,
            })
        }
    }
}

fn cap<'a>(iter: impl Iterator<Item = &'a Definition>, limit: usize) -> Vec<&'a Definition> {
    if limit == 0 {
        iter.collect()
    } else {
        iter.take(limit).collect()
    }
}

#[cfg(test)]
#[path = "definition_test.rs"]
mod tests;
