//! Built-in schema catalog.
//!
//! Each schema's migrations are numbered `.sql` file pairs embedded via
//! `include_str!`. The tables below are ordered by id and assembled into the
//! process-wide [`SchemaRegistry`] on first use.

use crate::definition::{Definition, Definitions};
use crate::error::CoreResult;
use crate::schema::{Schema, SchemaRegistry};
use std::sync::{Arc, LazyLock};

/// A single embedded migration.
struct Embedded {
    id: i32,
    name: &'static str,
    up: &'static str,
    down: &'static str,
}

macro_rules! embedded {
    ($id:expr, $schema:literal, $file:literal) => {
        Embedded {
            id: $id,
            name: $file,
            up: include_str!(concat!($schema, "/", $file, ".up.sql")),
            down: include_str!(concat!($schema, "/", $file, ".down.sql")),
        }
    };
}

static FRONTEND: &[Embedded] = &[
    embedded!(1, "frontend", "v001_initial"),
    embedded!(2, "frontend", "v002_user_emails"),
    embedded!(3, "frontend", "v003_executor_heartbeats"),
];

static CODEINTEL: &[Embedded] = &[
    embedded!(1, "codeintel", "v001_initial"),
    embedded!(2, "codeintel", "v002_result_chunks"),
];

static CODEINSIGHTS: &[Embedded] = &[
    embedded!(1, "codeinsights", "v001_initial"),
    embedded!(2, "codeinsights", "v002_dashboards"),
];

/// Names of the built-in schemas, in their conventional run order.
pub const BUILTIN_SCHEMAS: &[&str] = &["frontend", "codeintel", "codeinsights"];

static REGISTRY: LazyLock<Arc<SchemaRegistry>> = LazyLock::new(|| {
    Arc::new(build().expect("built-in migration catalog must be well-formed"))
});

pub(crate) fn builtin() -> Arc<SchemaRegistry> {
    Arc::clone(&REGISTRY)
}

fn build() -> CoreResult<SchemaRegistry> {
    let tables: [(&str, &[Embedded]); 3] = [
        ("frontend", FRONTEND),
        ("codeintel", CODEINTEL),
        ("codeinsights", CODEINSIGHTS),
    ];

    let schemas = tables
        .into_iter()
        .map(|(name, entries)| {
            let definitions = entries
                .iter()
                .map(|e| Definition::new(e.id, e.name, e.up, e.down))
                .collect();
            Definitions::new(name, definitions).map(Schema::new)
        })
        .collect::<CoreResult<Vec<_>>>()?;

    SchemaRegistry::new(schemas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_well_formed() {
        let registry = build().unwrap();
        assert_eq!(registry.len(), BUILTIN_SCHEMAS.len());
        for name in BUILTIN_SCHEMAS {
            assert!(registry.get(name).is_some(), "missing built-in schema {name}");
        }
    }

    #[test]
    fn test_catalog_versions() {
        let registry = builtin();
        assert_eq!(registry.get("frontend").unwrap().definitions.latest(), Some(3));
        assert_eq!(registry.get("codeintel").unwrap().definitions.latest(), Some(2));
        assert_eq!(
            registry.get("codeinsights").unwrap().definitions.latest(),
            Some(2)
        );
    }

    #[test]
    fn test_every_migration_has_both_bodies() {
        for schema in builtin().iter() {
            for def in schema.definitions.iter() {
                assert!(!def.up.trim().is_empty(), "{}/{} up", schema.name, def.name);
                assert!(!def.down.trim().is_empty(), "{}/{} down", schema.name, def.name);
            }
        }
    }
}
