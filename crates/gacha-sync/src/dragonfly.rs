//! `Dragonfly` (Redis-compatible) history storage.
//!
//! Each tier history is one string key holding a JSON array of event ids.
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{prefix}:{channel}:tier:{slug}` | JSON | Ordered event ids for one tier |

use fred::prelude::*;

use crate::error::SyncError;

/// Connection handle to a `Dragonfly` instance.
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL follows the Redis scheme: `redis://host:port` or
    /// `redis://host:port/db`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the URL cannot be parsed.
    /// Returns [`SyncError::RemoteUnavailable`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, SyncError> {
        let config = Config::from_url(url)
            .map_err(|e| SyncError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Read the raw JSON string at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteUnavailable`] if the read fails.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, SyncError> {
        let value: Option<String> = self.client.get(key).await?;
        Ok(value)
    }

    /// Overwrite `key` with a raw JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteUnavailable`] if the write fails.
    pub async fn set_raw(&self, key: &str, json: &str) -> Result<(), SyncError> {
        let _: () = self.client.set(key, json, None, None, false).await?;
        Ok(())
    }

    /// Delete `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteUnavailable`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), SyncError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }
}

impl std::fmt::Debug for DragonflyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragonflyStore").finish_non_exhaustive()
    }
}
