//! Messages exchanged with the overlay surface and with peer instances.
//!
//! # Subjects
//!
//! | Direction | Message | Transport |
//! |-----------|---------|-----------|
//! | engine -> overlay | [`RenderCommand`] | NATS `gacha.{channel}.render` |
//! | overlay -> engine | [`MediaSignal`] | NATS `gacha.{channel}.media` |
//! | peer <-> peer | [`PeerMessage`] | NATS `gacha.{channel}.peer` |
//! | overlay -> engine | [`ChatMessage`] | NATS `gacha.{channel}.chat` |
//! | engine -> platform | [`PlatformBroadcast`] | HTTP `POST /channels/{id}/socket` |

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::EventId;
use crate::media::MediaKind;

/// Subject carrying [`RenderCommand`]s for `channel`.
pub fn render_subject(channel: &str) -> String {
    format!("gacha.{channel}.render")
}

/// Subject carrying [`MediaSignal`]s for `channel`.
pub fn media_subject(channel: &str) -> String {
    format!("gacha.{channel}.media")
}

/// Subject carrying [`PeerMessage`]s for `channel`.
pub fn peer_subject(channel: &str) -> String {
    format!("gacha.{channel}.peer")
}

/// Subject carrying [`ChatMessage`]s for `channel`.
pub fn chat_subject(channel: &str) -> String {
    format!("gacha.{channel}.chat")
}

/// A viewer chat line forwarded by the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChatMessage {
    /// Display name of the sender.
    pub user: String,
    /// Raw message text.
    pub text: String,
}

/// A single side effect the overlay surface must perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "command", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RenderCommand {
    /// Put an image on screen (initially transparent).
    ShowImage {
        /// Event being displayed.
        event_id: EventId,
        /// Image URL.
        url: String,
    },
    /// Start a video from time zero.
    PlayVideo {
        /// Event being displayed.
        event_id: EventId,
        /// Video URL.
        url: String,
    },
    /// Start an audio clip from time zero.
    PlayAudio {
        /// Event being displayed.
        event_id: EventId,
        /// Audio URL.
        url: String,
    },
    /// Ramp the image opacity from 0 to 1.
    FadeIn {
        /// Event being displayed.
        event_id: EventId,
        /// Ramp length in milliseconds.
        #[ts(type = "number")]
        duration_ms: u64,
    },
    /// Ramp the image opacity from 1 to 0.
    FadeOut {
        /// Event being displayed.
        event_id: EventId,
        /// Ramp length in milliseconds.
        #[ts(type = "number")]
        duration_ms: u64,
    },
    /// Pause, rewind, and unset every media element.
    Clear {
        /// Event whose playback is being torn down.
        event_id: EventId,
    },
}

/// Playback feedback reported by the overlay surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "signal", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MediaSignal {
    /// A media element reached its natural end.
    Ended {
        /// Event the media belongs to.
        event_id: EventId,
        /// Which element ended.
        kind: MediaKind,
    },
    /// A media element failed to load or play.
    Error {
        /// Event the media belongs to.
        event_id: EventId,
        /// Which element failed.
        kind: MediaKind,
        /// Error code and message reported by the element.
        detail: String,
    },
}

impl MediaSignal {
    /// The event this signal refers to.
    pub const fn event_id(&self) -> EventId {
        match self {
            Self::Ended { event_id, .. } | Self::Error { event_id, .. } => *event_id,
        }
    }
}

/// Message exchanged between overlay instances sharing one store.
///
/// Serialized as `{"type": "gachaUpdate"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type")]
#[ts(export, export_to = "bindings/")]
pub enum PeerMessage {
    /// A peer has committed new events; reconcile exactly.
    #[serde(rename = "gachaUpdate")]
    GachaUpdate,
}

/// Body of the platform socket broadcast that fans a peer message out to
/// every overlay on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformBroadcast {
    /// Always `"event"`.
    pub event: String,
    /// Channel-scoped payload.
    pub data: PlatformBroadcastData,
}

/// Inner payload of a [`PlatformBroadcast`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformBroadcastData {
    /// Platform channel identifier.
    pub channel: String,
    /// Peer message type (`"gachaUpdate"`).
    #[serde(rename = "type")]
    pub kind: String,
}

impl PlatformBroadcast {
    /// Build the `gachaUpdate` broadcast for `channel`.
    pub fn gacha_update(channel: impl Into<String>) -> Self {
        Self {
            event: "event".to_owned(),
            data: PlatformBroadcastData {
                channel: channel.into(),
                kind: "gachaUpdate".to_owned(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn subjects_are_channel_scoped() {
        assert_eq!(render_subject("abc"), "gacha.abc.render");
        assert_eq!(media_subject("abc"), "gacha.abc.media");
        assert_eq!(peer_subject("abc"), "gacha.abc.peer");
        assert_eq!(chat_subject("abc"), "gacha.abc.chat");
    }

    #[test]
    fn peer_message_wire_shape() {
        let json = serde_json::to_value(PeerMessage::GachaUpdate).unwrap();
        assert_eq!(json, serde_json::json!({"type": "gachaUpdate"}));

        let parsed: PeerMessage = serde_json::from_str(r#"{"type":"gachaUpdate"}"#).unwrap();
        assert_eq!(parsed, PeerMessage::GachaUpdate);
    }

    #[test]
    fn unknown_peer_message_is_rejected() {
        let parsed = serde_json::from_str::<PeerMessage>(r#"{"type":"follow"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn platform_broadcast_wire_shape() {
        let json = serde_json::to_value(PlatformBroadcast::gacha_update("chan-1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "event",
                "data": {"channel": "chan-1", "type": "gachaUpdate"}
            })
        );
    }

    #[test]
    fn media_signal_is_tagged() {
        let id = EventId::new();
        let raw = serde_json::json!({
            "signal": "error",
            "event_id": id,
            "kind": "video",
            "detail": "4 MEDIA_ERR_SRC_NOT_SUPPORTED"
        });
        let signal: MediaSignal = serde_json::from_value(raw).unwrap();
        assert_eq!(signal.event_id(), id);
        assert!(matches!(signal, MediaSignal::Error { kind: MediaKind::Video, .. }));
    }

    #[test]
    fn render_command_is_tagged() {
        let id = EventId::new();
        let json = serde_json::to_value(RenderCommand::FadeIn {
            event_id: id,
            duration_ms: 1000,
        })
        .unwrap();
        assert_eq!(json.get("command").and_then(|v| v.as_str()), Some("fade_in"));
        assert_eq!(json.get("duration_ms").and_then(serde_json::Value::as_u64), Some(1000));
    }
}
