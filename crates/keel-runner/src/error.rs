//! Error types for keel-runner

use crate::options::Direction;
use keel_core::CoreError;
use keel_db::DbError;
use thiserror::Error;

/// Runner errors.
///
/// Every variant that concerns one schema carries its name; migration step
/// failures also carry the exact id and direction.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Schema name is not in the registry or has no store factory (R001)
    #[error("[R001] Unknown schema \"{name}\"")]
    UnknownSchema { name: String },

    /// Store factory or store query failed; reported verbatim
    #[error(transparent)]
    Store(#[from] DbError),

    /// Schema was left dirty by an interrupted migration (R002)
    #[error(
        "[R002] Dirty database: schema \"{schema}\" is dirty at version {version}. \
         Repair it manually, then force a clean version"
    )]
    DirtyDatabase { schema: String, version: i32 },

    /// Lock acquisition reported an error (R003)
    #[error("[R003] Failed to acquire lock for schema \"{schema}\": {source}")]
    LockAcquisition {
        schema: String,
        #[source]
        source: DbError,
    },

    /// Lock is held by another runner (R004)
    #[error("[R004] Failed to acquire lock for schema \"{schema}\": held by another runner")]
    LockNotAcquired { schema: String },

    /// Releasing the lock failed after an otherwise successful run (R005)
    #[error("[R005] Failed to release lock for schema \"{schema}\": {source}")]
    Unlock {
        schema: String,
        #[source]
        source: DbError,
    },

    /// Definition selection failed (unknown version)
    #[error(transparent)]
    Definitions(#[from] CoreError),

    /// A single migration step failed (R006)
    #[error("[R006] Failed {direction} migration {id} for schema \"{schema}\": {source}")]
    MigrationFailed {
        schema: String,
        id: i32,
        direction: Direction,
        #[source]
        source: DbError,
    },

    /// Processing was cancelled (R007)
    #[error("[R007] Migration of schema \"{schema}\" was cancelled")]
    Cancelled { schema: String },

    /// Recorded version disagrees with the code's definitions (R008)
    #[error(
        "[R008] Schema \"{}\" is out of date: current version {}, expected version {}{}",
        .schema,
        .current_version,
        .expected_version,
        advisory_note(.unknown_version)
    )]
    SchemaOutOfDate {
        schema: String,
        current_version: i32,
        expected_version: i32,
        /// The recorded version is not a known definition, so the expected
        /// version was derived from the full definition set and is advisory.
        unknown_version: bool,
    },

    /// More than one schema failed during a fanned-out run (R009)
    #[error("[R009] {}", summarize(.0))]
    MultipleSchemasFailed(Vec<RunnerError>),
}

/// Result type alias for RunnerError
pub type RunnerResult<T> = Result<T, RunnerError>;

impl RunnerError {
    /// True for the validate-only drift signal.
    pub fn is_drift(&self) -> bool {
        matches!(self, RunnerError::SchemaOutOfDate { .. })
    }

    /// True if a dirty schema blocked the operation.
    pub fn is_dirty(&self) -> bool {
        matches!(self, RunnerError::DirtyDatabase { .. })
    }
}

fn advisory_note(unknown_version: &bool) -> &'static str {
    if *unknown_version {
        " (recorded version is not a known migration; the database may be newer than this build)"
    } else {
        ""
    }
}

fn summarize(errors: &[RunnerError]) -> String {
    let details = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} schemas failed: {details}", errors.len())
}
