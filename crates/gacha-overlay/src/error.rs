//! Error types for the overlay binary.
//!
//! [`OverlayError`] is the top-level error type that wraps all possible
//! failure modes during startup and command handling.

/// Top-level error for the overlay binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: gacha_core::config::ConfigError,
    },

    /// Store or broadcast setup failed.
    #[error("sync error: {source}")]
    Sync {
        /// The underlying sync error.
        #[from]
        source: gacha_sync::SyncError,
    },

    /// A chat command could not be run.
    #[error("{source}")]
    Command {
        /// The underlying command error.
        #[from]
        source: gacha_core::command::CommandError,
    },

    /// Tier selection failed.
    #[error("selection error: {source}")]
    Select {
        /// The underlying selection error.
        #[from]
        source: gacha_core::selector::SelectError,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },
}
