//! Migration store trait definitions

use crate::error::DbResult;
use async_trait::async_trait;
use keel_core::Definition;

/// Persisted version state of one schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionState {
    /// Id of the last applied definition, 0 when un-migrated
    pub version: i32,
    /// A previous migration step was interrupted
    pub dirty: bool,
    /// Whether any version record exists at all
    pub exists: bool,
}

impl VersionState {
    /// State of a schema that has never been migrated.
    pub fn unmigrated() -> Self {
        Self::default()
    }

    /// Clean state at `version`.
    pub fn at(version: i32) -> Self {
        Self {
            version,
            dirty: false,
            exists: version != 0,
        }
    }
}

/// Per-schema migration store.
///
/// A store is bound to exactly one schema. It owns that schema's version
/// record and lock, and persists version and dirty state as a side effect of
/// [`up`](Store::up) and [`down`](Store::down).
///
/// Implementations must be Send + Sync for async operation.
#[async_trait]
pub trait Store: Send + Sync {
    /// Current version, dirty flag, and whether a record exists
    async fn version(&self) -> DbResult<VersionState>;

    /// Try to take the schema-scoped exclusive lock.
    ///
    /// `Ok(false)` means the lock is held elsewhere.
    async fn lock(&self) -> DbResult<bool>;

    /// Release a lock taken by this handle.
    ///
    /// A no-op when this handle holds no lock.
    async fn unlock(&self) -> DbResult<()>;

    /// Apply exactly one definition and record it.
    ///
    /// On failure the store leaves itself dirty.
    async fn up(&self, definition: &Definition) -> DbResult<()>;

    /// Revert exactly one definition and record it.
    ///
    /// On failure the store leaves itself dirty.
    async fn down(&self, definition: &Definition) -> DbResult<()>;

    /// Store type identifier for logging
    fn store_type(&self) -> &'static str;
}

/// Constructor for a schema's store.
///
/// Factories may open connections; any failure is reported verbatim.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Open a store handle
    async fn open(&self) -> DbResult<Box<dyn Store>>;
}

#[async_trait]
impl<F> StoreFactory for F
where
    F: Fn() -> DbResult<Box<dyn Store>> + Send + Sync,
{
    async fn open(&self) -> DbResult<Box<dyn Store>> {
        self()
    }
}
