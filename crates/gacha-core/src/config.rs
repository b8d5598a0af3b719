//! Configuration loading and typed config structures for the gacha overlay.
//!
//! The canonical configuration lives in `gacha-config.yaml` at the project
//! root. Every field has a default, so an empty file (or no file at all)
//! yields a runnable single-instance setup. Infrastructure URLs and platform
//! credentials can be overridden from the environment.
//!
//! Tiers come from one of two places: an explicit `tiers` list, or the
//! overlay platform's flat `field_data` map (see [`crate::field_data`]). The
//! explicit list wins when both are present.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use gacha_types::RewardTier;
use serde::Deserialize;

use crate::field_data::{self, FieldDataError};
use crate::selector::{SelectError, WeightTable};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The explicit tier list does not form a valid weight table.
    #[error("invalid tier list: {source}")]
    Tiers {
        /// The underlying table error.
        #[from]
        source: SelectError,
    },

    /// The field-data map could not be turned into tiers.
    #[error("invalid field data: {source}")]
    FieldData {
        /// The underlying field-data error.
        #[from]
        source: FieldDataError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level overlay configuration.
///
/// Mirrors the structure of `gacha-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OverlayConfig {
    /// Which channel this overlay belongs to.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Connection URLs for external services.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Shared history store.
    #[serde(default)]
    pub store: StoreConfig,

    /// How peers are told to re-sync.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Soft-update cadence.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Playback timing.
    #[serde(default)]
    pub display: DisplayConfig,

    /// Chat command limits.
    #[serde(default)]
    pub commands: CommandConfig,

    /// Explicit tier list. Takes precedence over `field_data`.
    #[serde(default)]
    pub tiers: Vec<TierConfig>,

    /// Flat platform field data (`_iGroupN-section-field` keys).
    #[serde(default)]
    pub field_data: BTreeMap<String, serde_json::Value>,
}

impl OverlayConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields the
    /// defaults (with environment overrides applied).
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file), except for "not found".
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override values from environment variables.
    ///
    /// Checks `DRAGONFLY_URL`, `NATS_URL`, `SE_API_TOKEN`, and
    /// `SE_CHANNEL_ID`.
    pub fn apply_env_overrides(&mut self) {
        self.infrastructure.apply_env_overrides();
        if let Ok(val) = std::env::var("SE_API_TOKEN") {
            self.broadcast.api_token = Some(val);
        }
        if let Ok(val) = std::env::var("SE_CHANNEL_ID") {
            self.channel.id = val;
        }
    }

    /// Range checks that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "channel.id",
                reason: "must not be blank".to_owned(),
            });
        }
        if self.sync.soft_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.soft_interval_secs",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.commands.max_roll_count == 0 {
            return Err(ConfigError::Invalid {
                field: "commands.max_roll_count",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.broadcast.mode == BroadcastMode::Http
            && self.broadcast.api_token.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::Invalid {
                field: "broadcast.api_token",
                reason: "required for http broadcast (or set SE_API_TOKEN)".to_owned(),
            });
        }
        Ok(())
    }

    /// Build the weight table from `tiers`, falling back to `field_data`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Tiers`] or [`ConfigError::FieldData`] when the
    /// configured tiers cannot be sampled from.
    pub fn weight_table(&self) -> Result<WeightTable, ConfigError> {
        if self.tiers.is_empty() {
            return Ok(field_data::weight_table(&self.field_data)?);
        }
        let weighted = self
            .tiers
            .iter()
            .map(|tier| (tier.weight, tier.to_reward_tier()))
            .collect();
        Ok(WeightTable::from_weights(weighted)?)
    }
}

/// Channel identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Channel id. Namespaces store keys and NATS subjects.
    #[serde(default = "default_channel_id")]
    pub id: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: default_channel_id(),
        }
    }
}

/// Infrastructure connection URLs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Dragonfly (Redis-compatible) connection URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,

    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
}

impl InfrastructureConfig {
    /// Override connection URLs from environment variables.
    ///
    /// Checks `DRAGONFLY_URL` and `NATS_URL`. If set, the environment
    /// variable takes precedence over the YAML value.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = val;
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            dragonfly_url: default_dragonfly_url(),
            nats_url: default_nats_url(),
        }
    }
}

/// Which store backend holds tier histories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Dragonfly / Redis, shared across overlay instances.
    #[default]
    Dragonfly,
    /// Process-local memory. Histories do not survive a restart.
    Memory,
}

/// Store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Prefix for every history key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// How a flushed instance notifies its peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// Platform socket endpoint over HTTP.
    Http,
    /// Publish on the channel's NATS peer subject.
    #[default]
    Nats,
    /// Never notify.
    Disabled,
}

/// Peer broadcast settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Delivery mode.
    #[serde(default)]
    pub mode: BroadcastMode,

    /// Base URL of the platform API (HTTP mode).
    #[serde(default = "default_broadcast_endpoint")]
    pub endpoint: String,

    /// Platform API token (HTTP mode). Prefer `SE_API_TOKEN`.
    #[serde(default)]
    pub api_token: Option<String>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            mode: BroadcastMode::default(),
            endpoint: default_broadcast_endpoint(),
            api_token: None,
        }
    }
}

/// Soft-update cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Seconds between soft updates.
    #[serde(default = "default_soft_interval_secs")]
    pub soft_interval_secs: u64,
}

impl SyncConfig {
    /// The soft-update period.
    #[must_use]
    pub const fn soft_interval(&self) -> Duration {
        Duration::from_secs(self.soft_interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            soft_interval_secs: default_soft_interval_secs(),
        }
    }
}

/// Playback timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisplayConfig {
    /// Length of the image fade-in and fade-out ramps, in milliseconds.
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u64,
}

impl DisplayConfig {
    /// The fade ramp length.
    #[must_use]
    pub const fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fade_ms: default_fade_ms(),
        }
    }
}

/// Chat command limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandConfig {
    /// Upper bound for `+rollcount`.
    #[serde(default = "default_max_roll_count")]
    pub max_roll_count: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_roll_count: default_max_roll_count(),
        }
    }
}

/// One explicitly configured tier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TierConfig {
    /// Display label, also used to derive the tier's history key.
    pub label: String,

    /// Relative weight.
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Primary media URL (image or video).
    pub media: String,

    /// Optional audio played alongside an image.
    #[serde(default)]
    pub audio: Option<String>,

    /// Image display time in seconds.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl TierConfig {
    /// Convert to the runtime tier record.
    #[must_use]
    pub fn to_reward_tier(&self) -> RewardTier {
        RewardTier {
            label: self.label.clone(),
            media: self.media.clone(),
            audio: self.audio.clone(),
            duration_secs: self.duration_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

fn default_channel_id() -> String {
    "local".to_owned()
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_key_prefix() -> String {
    "gacha".to_owned()
}

fn default_broadcast_endpoint() -> String {
    "https://api.streamelements.com/kappa/v2".to_owned()
}

const fn default_soft_interval_secs() -> u64 {
    900
}

const fn default_fade_ms() -> u64 {
    1_000
}

const fn default_max_roll_count() -> u32 {
    10
}

const fn default_weight() -> f64 {
    1.0
}
