//! Shared type definitions for the gacha overlay.
//!
//! This crate is the single source of truth for the data model shared by the
//! selection, display, and synchronization crates. Wire types flow downstream
//! to `TypeScript` via `ts-rs` for the browser overlay that renders events.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for gacha event identifiers
//! - [`media`] -- Media kinds and the fixed file-extension table
//! - [`tier`] -- Reward tiers, weighted entries, and gacha events
//! - [`wire`] -- Messages exchanged with the overlay surface and peers

pub mod ids;
pub mod media;
pub mod tier;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use ids::EventId;
pub use media::MediaKind;
pub use tier::{GachaEvent, RewardTier, WeightedEntry};
pub use wire::{
    ChatMessage, MediaSignal, PeerMessage, PlatformBroadcast, PlatformBroadcastData, RenderCommand,
};
