//! keel-core - Core library for Keel
//!
//! This crate provides migration definitions, the schema registry with its
//! built-in catalog, and project configuration shared by every Keel
//! component.

pub mod catalog;
pub mod config;
pub mod definition;
pub mod error;
pub mod schema;

pub use catalog::BUILTIN_SCHEMAS;
pub use config::Config;
pub use definition::{Definition, Definitions};
pub use error::{CoreError, CoreResult};
pub use schema::{Schema, SchemaRegistry};
