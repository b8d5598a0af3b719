//! Process-local history store.
//!
//! Clones share one map, so several engines (or several simulated overlay
//! instances in tests) can contend on the same keys. The store can be
//! switched offline to exercise the retry path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::SyncError;

#[derive(Debug, Default)]
struct Inner {
    values: Mutex<HashMap<String, Value>>,
    offline: AtomicBool,
    writes: AtomicU64,
}

/// In-memory store with shared, cloneable handles.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteUnavailable`] while the store is offline.
    pub fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        self.check_online()?;
        Ok(self.values().get(key).cloned())
    }

    /// Overwrite `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteUnavailable`] while the store is offline.
    pub fn set(&self, key: &str, value: Value) -> Result<(), SyncError> {
        self.check_online()?;
        self.values().insert(key.to_owned(), value);
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_online(&self, online: bool) {
        self.inner.offline.store(!online, Ordering::Relaxed);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.inner.offline.load(Ordering::Relaxed) {
            return Err(SyncError::RemoteUnavailable(
                "memory store is offline".to_owned(),
            ));
        }
        Ok(())
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.inner
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
