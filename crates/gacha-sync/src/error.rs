//! Error types for history synchronization.

/// Errors that can occur while syncing event histories.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The stored value exists but is not an array of event ids.
    ///
    /// Never repaired automatically; an operator has to fix the key.
    #[error("invalid remote state at {key}: {reason}")]
    InvalidRemoteState {
        /// Store key holding the bad value.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The store or the broadcast endpoint could not be reached.
    ///
    /// Local buffers are kept and the operation is retried next tick.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error (bad URL, missing credentials).
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<fred::error::Error> for SyncError {
    fn from(e: fred::error::Error) -> Self {
        Self::RemoteUnavailable(format!("Dragonfly: {e}"))
    }
}

impl SyncError {
    /// Whether retrying later could succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }
}
