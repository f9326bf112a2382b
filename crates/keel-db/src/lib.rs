//! keel-db - Migration store layer for Keel
//!
//! This crate provides the `Store` contract the runner depends on, plus
//! a DuckDB implementation and an in-memory implementation.

pub mod duckdb;
pub mod error;
pub mod memory;
pub mod traits;

pub use duckdb::{open_connection, DuckDbStore, LockHolder, SharedConnection};
pub use error::{DbError, DbResult};
pub use memory::{MemoryStore, StoreCall};
pub use traits::{Store, StoreFactory, VersionState};
