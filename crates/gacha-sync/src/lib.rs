//! Shared event-history synchronization for the gacha overlay.
//!
//! Every overlay instance on a channel keeps a local buffer of the events it
//! rolled and reconciles it with a shared store:
//!
//! ```text
//! roll --> SyncHub::record --> SyncEngine (local buffer)
//!                                  |
//!          soft ticker ----------> +-- soft_update --> RemoteStore
//!                                  |        |
//!                                  |        +--> PeerNotifier (gachaUpdate)
//!          peer listener --------> +-- hard_update --> RemoteStore
//! ```
//!
//! # Modules
//!
//! - [`engine`] -- Per-key hard/soft reconciliation
//! - [`hub`] -- Per-tier engines, soft ticker, and peer listener
//! - [`store`] -- [`RemoteStore`] dispatch and value validation
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend
//! - [`memory`] -- In-memory backend
//! - [`broadcast`] -- [`PeerNotifier`] over HTTP or NATS
//! - [`error`] -- Shared error types

pub mod broadcast;
pub mod dragonfly;
pub mod engine;
pub mod error;
pub mod hub;
pub mod memory;
pub mod store;

// Re-export primary types for convenience.
pub use broadcast::{HttpNotifier, NatsNotifier, PeerNotifier};
pub use dragonfly::DragonflyStore;
pub use engine::{SoftOutcome, SyncEngine};
pub use error::SyncError;
pub use hub::{SyncHub, SyncReport, history_key};
pub use memory::MemoryStore;
pub use store::RemoteStore;
