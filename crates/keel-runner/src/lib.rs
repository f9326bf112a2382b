//! keel-runner - Migration runner for Keel
//!
//! Brings independently versioned schemas to their target revision. Each
//! schema is locked for the duration of its run, dirty schemas are refused
//! up front, and a read-only validation mode reports drift.

mod cancel;
pub mod context;
pub mod error;
pub mod factories;
pub mod options;
pub mod runner;

pub use context::{ContextBuilder, SchemaContext};
pub use error::{RunnerError, RunnerResult};
pub use factories::StoreFactories;
pub use options::{Direction, Options};
pub use runner::{Runner, SchemaStatus};
pub use tokio_util::sync::CancellationToken;
