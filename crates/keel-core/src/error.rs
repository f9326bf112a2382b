//! Error types for keel-core

use thiserror::Error;

/// Core error type for Keel
#[derive(Error, Debug)]
pub enum CoreError {
    /// K001: Configuration file not found
    #[error("[K001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// K002: Failed to parse configuration file
    #[error("[K002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// K003: Invalid configuration value
    #[error("[K003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// K004: Migration definitions are malformed
    #[error("[K004] Invalid migration definitions for schema '{schema}': {message}")]
    InvalidDefinitions { schema: String, message: String },

    /// K005: Two schemas registered under the same name
    #[error("[K005] Duplicate schema name: {name}")]
    DuplicateSchema { name: String },

    /// K006: Recorded version does not match any known definition
    #[error("[K006] Unknown version {version} for schema '{schema}'")]
    UnknownVersion { schema: String, version: i32 },

    /// IO error with file path context
    #[error("IO error at {path}: {source}")]
    IoWithPath {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::ConfigParseError {
            message: err.to_string(),
        }
    }
}
