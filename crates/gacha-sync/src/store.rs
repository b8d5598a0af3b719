//! Remote history store abstraction.
//!
//! Histories are ordered arrays of event-id strings. Every backend exposes
//! the same two operations, `get` and `set`, and every read is validated:
//! a present value that is not an array of strings is reported as
//! [`SyncError::InvalidRemoteState`] and never silently replaced.

use serde_json::Value;

use crate::dragonfly::DragonflyStore;
use crate::error::SyncError;
use crate::memory::MemoryStore;

/// A history store.
///
/// Uses enum dispatch instead of trait objects because async methods
/// are not dyn-compatible.
#[derive(Debug, Clone)]
pub enum RemoteStore {
    /// Shared `Dragonfly` / Redis instance.
    Dragonfly(DragonflyStore),
    /// Process-local memory.
    Memory(MemoryStore),
}

impl RemoteStore {
    /// Read the history at `key`. `None` when the key has never been set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRemoteState`] if the stored value is not an
    /// array of strings, or [`SyncError::RemoteUnavailable`] if the read
    /// fails.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<String>>, SyncError> {
        let value = match self {
            Self::Dragonfly(store) => match store.get_raw(key).await? {
                Some(raw) => Some(serde_json::from_str::<Value>(&raw).map_err(|e| {
                    SyncError::InvalidRemoteState {
                        key: key.to_owned(),
                        reason: format!("not JSON: {e}"),
                    }
                })?),
                None => None,
            },
            Self::Memory(store) => store.get(key)?,
        };
        value.map(|value| decode(key, value)).transpose()
    }

    /// Overwrite the history at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteUnavailable`] if the write fails.
    pub async fn set(&self, key: &str, ids: &[String]) -> Result<(), SyncError> {
        match self {
            Self::Dragonfly(store) => {
                let json = serde_json::to_string(ids)?;
                store.set_raw(key, &json).await
            }
            Self::Memory(store) => store.set(key, serde_json::to_value(ids)?),
        }
    }

    /// Backend name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dragonfly(_) => "dragonfly",
            Self::Memory(_) => "memory",
        }
    }
}

/// Validate that a stored value is an array of event-id strings.
fn decode(key: &str, value: Value) -> Result<Vec<String>, SyncError> {
    let invalid = |reason: String| SyncError::InvalidRemoteState {
        key: key.to_owned(),
        reason,
    };
    let Value::Array(items) = value else {
        return Err(invalid(format!("expected an array, found {value}")));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(id) => Ok(id),
            other => Err(invalid(format!("element {index} is not a string: {other}"))),
        })
        .collect()
}
