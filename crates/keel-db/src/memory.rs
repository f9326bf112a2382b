//! In-memory migration store.
//!
//! Keeps version state, the schema lock, and a log of every call in process
//! memory. Handles created with [`MemoryStore::handle`] share state the way
//! two connections to one database would, which makes this store useful for
//! exercising lock contention and failure paths without a real database.

use crate::error::{DbError, DbResult};
use crate::traits::{Store, StoreFactory, VersionState};
use async_trait::async_trait;
use keel_core::Definition;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A store operation, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    Version,
    Lock,
    Unlock,
    Up(i32),
    Down(i32),
}

type UpHook = Box<dyn Fn(i32) + Send + Sync>;

#[derive(Default)]
struct Faults {
    fail_version: Option<String>,
    fail_lock: Option<String>,
    refuse_lock: bool,
    fail_unlock: Option<String>,
    fail_up: Option<i32>,
    fail_down: Option<i32>,
}

#[derive(Default)]
struct Shared {
    applied: Vec<i32>,
    dirty: bool,
    locked: bool,
    calls: Vec<StoreCall>,
    faults: Faults,
    on_up: Option<UpHook>,
}

impl Shared {
    fn state(&self) -> VersionState {
        VersionState {
            version: self.applied.last().copied().unwrap_or(0),
            dirty: self.dirty,
            exists: !self.applied.is_empty(),
        }
    }
}

/// In-memory migration store handle
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    held: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an un-migrated store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            held: AtomicBool::new(false),
        }
    }

    /// New handle over the same state. The handle does not inherit the lock.
    pub fn handle(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            held: AtomicBool::new(false),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start with `ids` already applied, in order.
    pub fn with_applied(self, ids: &[i32]) -> Self {
        self.shared().applied = ids.to_vec();
        self
    }

    /// Start in the dirty state.
    pub fn dirty(self) -> Self {
        self.shared().dirty = true;
        self
    }

    /// Make `version` fail with `message`.
    pub fn fail_version(self, message: &str) -> Self {
        self.shared().faults.fail_version = Some(message.to_string());
        self
    }

    /// Make `lock` fail with `message`.
    pub fn fail_lock(self, message: &str) -> Self {
        self.shared().faults.fail_lock = Some(message.to_string());
        self
    }

    /// Make `lock` report that the lock is held elsewhere.
    pub fn refuse_lock(self) -> Self {
        self.shared().faults.refuse_lock = true;
        self
    }

    /// Make `unlock` fail with `message`.
    pub fn fail_unlock(self, message: &str) -> Self {
        self.shared().faults.fail_unlock = Some(message.to_string());
        self
    }

    /// Make applying definition `id` fail.
    pub fn fail_up_at(self, id: i32) -> Self {
        self.shared().faults.fail_up = Some(id);
        self
    }

    /// Make reverting definition `id` fail.
    pub fn fail_down_at(self, id: i32) -> Self {
        self.shared().faults.fail_down = Some(id);
        self
    }

    /// Invoke `hook` with the id of every successfully applied definition.
    pub fn on_up(self, hook: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.shared().on_up = Some(Box::new(hook));
        self
    }

    /// Current version state, without recording a call.
    pub fn state(&self) -> VersionState {
        self.shared().state()
    }

    /// Whether any handle currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.shared().locked
    }

    /// Every call made through any handle, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.shared().calls.clone()
    }

    /// Ids passed to `up`, in order.
    pub fn up_ids(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Up(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Ids passed to `down`, in order.
    pub fn down_ids(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Down(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Number of `lock` calls made.
    pub fn lock_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == StoreCall::Lock)
            .count()
    }

    /// Number of `unlock` calls made.
    pub fn unlock_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == StoreCall::Unlock)
            .count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn version(&self) -> DbResult<VersionState> {
        let mut shared = self.shared.lock()?;
        shared.calls.push(StoreCall::Version);
        if let Some(message) = &shared.faults.fail_version {
            return Err(DbError::ConnectionError(message.clone()));
        }
        Ok(shared.state())
    }

    async fn lock(&self) -> DbResult<bool> {
        let mut shared = self.shared.lock()?;
        shared.calls.push(StoreCall::Lock);
        if let Some(message) = &shared.faults.fail_lock {
            return Err(DbError::ExecutionError(message.clone()));
        }
        if self.held.load(Ordering::SeqCst) {
            return Ok(true);
        }
        if shared.faults.refuse_lock || shared.locked {
            return Ok(false);
        }
        shared.locked = true;
        self.held.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn unlock(&self) -> DbResult<()> {
        let mut shared = self.shared.lock()?;
        shared.calls.push(StoreCall::Unlock);
        if let Some(message) = &shared.faults.fail_unlock {
            return Err(DbError::ExecutionError(message.clone()));
        }
        if self.held.swap(false, Ordering::SeqCst) {
            shared.locked = false;
        }
        Ok(())
    }

    async fn up(&self, definition: &Definition) -> DbResult<()> {
        let hook_result = {
            let mut shared = self.shared.lock()?;
            shared.calls.push(StoreCall::Up(definition.id));
            shared.applied.push(definition.id);
            if shared.faults.fail_up == Some(definition.id) {
                shared.dirty = true;
                return Err(DbError::ExecutionError(format!(
                    "migration {} up: injected failure",
                    definition.id
                )));
            }
            shared.on_up.take()
        };

        // The hook runs without the state lock so it may inspect the store.
        if let Some(hook) = hook_result {
            hook(definition.id);
            self.shared.lock()?.on_up = Some(hook);
        }
        Ok(())
    }

    async fn down(&self, definition: &Definition) -> DbResult<()> {
        let mut shared = self.shared.lock()?;
        shared.calls.push(StoreCall::Down(definition.id));
        if shared.faults.fail_down == Some(definition.id) {
            shared.dirty = true;
            return Err(DbError::ExecutionError(format!(
                "migration {} down: injected failure",
                definition.id
            )));
        }
        if let Some(pos) = shared.applied.iter().rposition(|id| *id == definition.id) {
            shared.applied.remove(pos);
        }
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl StoreFactory for MemoryStore {
    async fn open(&self) -> DbResult<Box<dyn Store>> {
        Ok(Box::new(self.handle()))
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
