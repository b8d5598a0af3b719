//! Reshape the overlay platform's flat field data into reward tiers.
//!
//! The platform hands the overlay a flat map whose interesting keys look like
//! `_iGroup<N>-<section>-<field>`, for example:
//!
//! ```text
//! _iGroup2-primary-label   = "Tier 2"
//! _iGroup2-settings-weight = 2
//! _iGroup2-settings-media  = "image"
//! _iGroup2-image-media     = "https://cdn/tier2.png"
//! _iGroup2-image-audio     = "https://cdn/tier2.mp3"
//! _iGroup2-image-time      = 10
//! _iGroup2-video-media     = "https://cdn/tier2.webm"
//! ```
//!
//! [`extract_groups`] nests these into one tree per group, and [`tiers`]
//! turns each group with a non-blank `primary.label` into a weighted
//! [`RewardTier`]. Keys that do not match the pattern are ignored.

use std::collections::BTreeMap;

use gacha_types::RewardTier;
use serde_json::Value;
use tracing::debug;

use crate::selector::{SelectError, WeightTable};

/// Key prefix shared by every tier field.
const GROUP_PREFIX: &str = "_igroup";

/// Errors raised while reshaping field data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldDataError {
    /// Two keys disagree on whether a path is a value or a section.
    #[error("field {key} conflicts with another field at the same path")]
    Conflict {
        /// The offending key.
        key: String,
    },

    /// A labelled group has neither a video nor an image URL.
    #[error("group {group} ({label}) has no media URL")]
    MissingMedia {
        /// Group key, e.g. `_iGroup3`.
        group: String,
        /// The group's tier label.
        label: String,
    },

    /// A field holds a value of the wrong shape.
    #[error("group {group} field {field} has invalid value {value}")]
    InvalidValue {
        /// Group key.
        group: String,
        /// Dotted field path, e.g. `settings.weight`.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// The resulting tiers do not form a valid weight table.
    #[error("{source}")]
    Table {
        /// The underlying table error.
        #[from]
        source: SelectError,
    },
}

/// A node in a group's nested field tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldNode {
    /// A leaf value.
    Value(Value),
    /// A named section of further fields.
    Section(BTreeMap<String, FieldNode>),
}

/// One `_iGroup<N>` tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGroup {
    /// Group key as written in the field data (e.g. `_iGroup3`).
    pub key: String,
    /// Top-level sections (`primary`, `settings`, `image`, `video`, ...).
    pub fields: BTreeMap<String, FieldNode>,
}

impl FieldGroup {
    /// Look up a leaf by path, e.g. `["image", "media"]`.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (last, sections) = path.split_last()?;
        let mut current = &self.fields;
        for section in sections {
            match current.get(*section)? {
                FieldNode::Section(next) => current = next,
                FieldNode::Value(_) => return None,
            }
        }
        match current.get(*last)? {
            FieldNode::Value(value) => Some(value),
            FieldNode::Section(_) => None,
        }
    }

    /// A non-blank string leaf.
    fn text(&self, path: &[&str]) -> Option<&str> {
        self.get(path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A numeric leaf, accepting numbers and numeric strings.
    ///
    /// `Ok(None)` when absent or blank, `Err` when present but not numeric.
    fn number(&self, path: &[&str]) -> Result<Option<f64>, FieldDataError> {
        let Some(value) = self.get(path) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return Ok(None),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Null => return Ok(None),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| FieldDataError::InvalidValue {
            group: self.key.clone(),
            field: path.join("."),
            value: value.to_string(),
        })
    }
}

/// Parse a key into `(group index, group key, path)`.
///
/// Returns `None` for keys outside the `_iGroup<N>-<section>-<field>` pattern.
fn parse_key(key: &str) -> Option<(u32, &str, Vec<&str>)> {
    let mut tokens = key.split('-');
    let group = tokens.next()?;
    let prefix = group.get(..GROUP_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(GROUP_PREFIX) {
        return None;
    }
    let index: u32 = group.get(GROUP_PREFIX.len()..)?.parse().ok()?;

    let path: Vec<&str> = tokens.collect();
    let well_formed = path.len() >= 2
        && path
            .iter()
            .all(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric()));
    well_formed.then_some((index, group, path))
}

/// Nest the `_iGroup` keys of a flat field map, ordered by group number.
///
/// # Errors
///
/// Returns [`FieldDataError::Conflict`] when one key uses a path as a value
/// and another uses it as a section.
pub fn extract_groups(
    field_data: &BTreeMap<String, Value>,
) -> Result<Vec<FieldGroup>, FieldDataError> {
    let mut groups: BTreeMap<u32, FieldGroup> = BTreeMap::new();

    for (key, value) in field_data {
        let Some((index, group_key, path)) = parse_key(key) else {
            continue;
        };
        let group = groups.entry(index).or_insert_with(|| FieldGroup {
            key: group_key.to_owned(),
            fields: BTreeMap::new(),
        });

        let conflict = || FieldDataError::Conflict { key: key.clone() };
        let Some((leaf, sections)) = path.split_last() else {
            continue;
        };

        let mut current = &mut group.fields;
        for section in sections {
            let node = current
                .entry((*section).to_owned())
                .or_insert_with(|| FieldNode::Section(BTreeMap::new()));
            current = match node {
                FieldNode::Section(next) => next,
                FieldNode::Value(_) => return Err(conflict()),
            };
        }
        if matches!(current.get(*leaf), Some(FieldNode::Section(_))) {
            return Err(conflict());
        }
        current.insert((*leaf).to_owned(), FieldNode::Value(value.clone()));
    }

    Ok(groups.into_values().collect())
}

/// Build weighted tiers from nested groups.
///
/// Groups without a non-blank `primary.label` are skipped. For the rest:
///
/// - weight: `settings.weight`, default 1
/// - media: `video.media` when `settings.media` is `video`, otherwise
///   `image.media`; each falls back to the other when blank
/// - audio: `image.audio`
/// - duration: `image.time`, or `image.duration` (seconds)
///
/// A non-numeric duration is dropped here; the tier then fails display
/// validation instead of the whole configuration.
///
/// # Errors
///
/// Returns [`FieldDataError::MissingMedia`] for a labelled group with no
/// media and [`FieldDataError::InvalidValue`] for a non-numeric weight.
pub fn tiers(groups: &[FieldGroup]) -> Result<Vec<(f64, RewardTier)>, FieldDataError> {
    let mut weighted = Vec::with_capacity(groups.len());

    for group in groups {
        let Some(label) = group.text(&["primary", "label"]) else {
            debug!(group = %group.key, "skipping field group without a label");
            continue;
        };

        let weight = group.number(&["settings", "weight"])?.unwrap_or(1.0);

        let video = group.text(&["video", "media"]);
        let image = group.text(&["image", "media"]);
        let prefers_image = group
            .text(&["settings", "media"])
            .is_some_and(|mode| mode.eq_ignore_ascii_case("image"));
        let media = if prefers_image {
            image.or(video)
        } else {
            video.or(image)
        };
        let media = media.ok_or_else(|| FieldDataError::MissingMedia {
            group: group.key.clone(),
            label: label.to_owned(),
        })?;

        let duration_secs = match group.number(&["image", "time"]) {
            Ok(Some(secs)) => Some(secs),
            Ok(None) => group.number(&["image", "duration"]).ok().flatten(),
            Err(_) => None,
        };

        weighted.push((
            weight,
            RewardTier {
                label: label.to_owned(),
                media: media.to_owned(),
                audio: group.text(&["image", "audio"]).map(ToOwned::to_owned),
                duration_secs,
            },
        ));
    }

    Ok(weighted)
}

/// Build a [`WeightTable`] straight from flat field data.
///
/// # Errors
///
/// Returns a [`FieldDataError`] if reshaping fails or the tiers do not form a
/// valid table (for example, no labelled groups at all).
pub fn weight_table(field_data: &BTreeMap<String, Value>) -> Result<WeightTable, FieldDataError> {
    let groups = extract_groups(field_data)?;
    let weighted = tiers(&groups)?;
    Ok(WeightTable::from_weights(weighted)?)
}
