//! Reward tiers, weighted table entries, and gacha events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::EventId;

/// A weighted reward class with its display media.
///
/// Built from configuration and never mutated afterwards. `duration_secs` is
/// only meaningful for image media; videos play until they end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RewardTier {
    /// Human-readable tier label (e.g. `"Tier 5"`, `"Legendary"`).
    pub label: String,
    /// URL of the image or video shown for this tier.
    pub media: String,
    /// Optional URL of an audio clip played alongside an image.
    #[serde(default)]
    pub audio: Option<String>,
    /// Display duration in seconds for image media.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl RewardTier {
    /// Create a tier with media only (no audio, no duration).
    pub fn new(label: impl Into<String>, media: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            media: media.into(),
            audio: None,
            duration_secs: None,
        }
    }

    /// Attach an audio clip.
    #[must_use]
    pub fn with_audio(mut self, audio: impl Into<String>) -> Self {
        self.audio = Some(audio.into());
        self
    }

    /// Attach a display duration in seconds.
    #[must_use]
    pub const fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_secs = Some(seconds);
        self
    }
}

/// One row of a cumulative weight table.
///
/// Across a table, `cumulative_weight` is positive and strictly increasing;
/// the last row's value is the table's total weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedEntry {
    /// Running sum of raw weights up to and including this tier.
    pub cumulative_weight: f64,
    /// The tier selected when a draw lands in this row's range.
    pub tier: RewardTier,
}

impl WeightedEntry {
    /// Create a table row.
    pub const fn new(cumulative_weight: f64, tier: RewardTier) -> Self {
        Self {
            cumulative_weight,
            tier,
        }
    }
}

/// One concrete, randomly selected reward occurrence queued for display.
///
/// Created once at selection time, enqueued once, and consumed exactly once
/// by the display scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GachaEvent {
    /// Identifier recorded in the tier's shared history.
    pub id: EventId,
    /// The tier chosen for this roll.
    pub tier: RewardTier,
    /// Chat user who triggered the roll.
    pub requested_by: String,
    /// Wall-clock time of the roll.
    pub rolled_at: DateTime<Utc>,
}

impl GachaEvent {
    /// Create a new event for `tier`, stamped with a fresh id and the current time.
    pub fn new(tier: RewardTier, requested_by: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            tier,
            requested_by: requested_by.into(),
            rolled_at: Utc::now(),
        }
    }

    /// The identifier as stored in tier histories.
    pub fn log_entry(&self) -> String {
        self.id.to_string()
    }
}
