//! Configuration types and parsing for keel.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main project configuration from keel.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Default database used by every schema without its own override
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Schemas managed by this project, with optional per-schema overrides.
    ///
    /// When empty, every schema in the registry is managed.
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaConfig>,
}

/// Database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the DuckDB database file, relative to the project directory.
    /// `:memory:` opens a transient in-memory database.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Per-schema overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Database path for this schema only
    #[serde(default)]
    pub path: Option<String>,
}

fn default_db_path() -> String {
    "keel.duckdb".to_string()
}

/// Special database path that opens an in-memory database.
pub const MEMORY_DB_PATH: &str = ":memory:";

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        log::debug!(
            "Loaded config {} from {} ({} schema override(s))",
            config.name,
            path.display(),
            config.schemas.len()
        );
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for keel.yml or keel.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("keel.yml");
        let yaml_path = dir.join("keel.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.database.path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "database.path cannot be empty".to_string(),
            });
        }

        for (name, schema) in &self.schemas {
            if name.trim().is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: "Schema names cannot be empty".to_string(),
                });
            }
            if schema.path.as_deref().is_some_and(|p| p.trim().is_empty()) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("schemas.{name}.path cannot be empty"),
                });
            }
        }

        Ok(())
    }

    /// Schema names listed in the config, sorted.
    pub fn schema_names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    /// Raw database path configured for `schema` (override or default).
    pub fn database_path(&self, schema: &str) -> &str {
        self.schemas
            .get(schema)
            .and_then(|s| s.path.as_deref())
            .unwrap_or(&self.database.path)
    }

    /// Database path for `schema` resolved against the project root.
    ///
    /// Returns `None` for in-memory databases.
    pub fn database_path_absolute(&self, schema: &str, root: &Path) -> Option<PathBuf> {
        let path = self.database_path(schema);
        if path == MEMORY_DB_PATH {
            return None;
        }
        let path = Path::new(path);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(root.join(path))
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
