//! Peer notification after a flush.
//!
//! When a soft update writes new events, the other overlay instances on the
//! channel are asked to run a hard update. The request goes out either
//! through the platform's socket endpoint (HTTP) or directly on the
//! channel's NATS peer subject.

use gacha_types::wire::peer_subject;
use gacha_types::{PeerMessage, PlatformBroadcast};
use tracing::debug;

use crate::error::SyncError;

/// Delivers `gachaUpdate` notifications to peers.
///
/// Uses enum dispatch instead of trait objects because async methods
/// are not dyn-compatible.
#[derive(Debug)]
pub enum PeerNotifier {
    /// Platform socket endpoint.
    Http(HttpNotifier),
    /// NATS peer subject.
    Nats(NatsNotifier),
    /// Notifications switched off.
    Disabled,
}

impl PeerNotifier {
    /// Tell peers to reconcile.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteUnavailable`] if delivery fails.
    pub async fn notify(&self) -> Result<(), SyncError> {
        match self {
            Self::Http(notifier) => notifier.notify().await,
            Self::Nats(notifier) => notifier.notify().await,
            Self::Disabled => Ok(()),
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Nats(_) => "nats",
            Self::Disabled => "disabled",
        }
    }
}

/// Posts a [`PlatformBroadcast`] to `{endpoint}/channels/{channel}/socket`.
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
    channel: String,
    api_token: String,
}

impl HttpNotifier {
    /// Create a notifier for `channel` against the platform API at
    /// `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `api_token` is blank.
    pub fn new(endpoint: &str, channel: &str, api_token: &str) -> Result<Self, SyncError> {
        if api_token.trim().is_empty() {
            return Err(SyncError::Config(
                "http broadcast requires an API token".to_owned(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            url: socket_url(endpoint, channel),
            channel: channel.to_owned(),
            api_token: api_token.to_owned(),
        })
    }

    /// The socket URL requests go to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn notify(&self) -> Result<(), SyncError> {
        let body = PlatformBroadcast::gacha_update(self.channel.as_str());
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("apikey {}", self.api_token))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(format!("broadcast request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(SyncError::RemoteUnavailable(format!(
                "broadcast returned {status}: {error_body}"
            )));
        }
        debug!(url = %self.url, "peer broadcast delivered");
        Ok(())
    }
}

impl std::fmt::Debug for HttpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNotifier")
            .field("url", &self.url)
            .field("api_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Publishes [`PeerMessage::GachaUpdate`] on `gacha.{channel}.peer`.
pub struct NatsNotifier {
    client: async_nats::Client,
    subject: String,
}

impl NatsNotifier {
    /// Create a notifier publishing on the channel's peer subject.
    pub fn new(client: async_nats::Client, channel: &str) -> Self {
        Self {
            client,
            subject: peer_subject(channel),
        }
    }

    async fn notify(&self) -> Result<(), SyncError> {
        let payload = serde_json::to_vec(&PeerMessage::GachaUpdate)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| {
                SyncError::RemoteUnavailable(format!("failed to publish to {}: {e}", self.subject))
            })?;
        // Publishes are buffered; a notification sent right before exit must reach the server.
        self.client.flush().await.map_err(|e| {
            SyncError::RemoteUnavailable(format!("failed to flush peer notification: {e}"))
        })?;
        debug!(subject = %self.subject, "peer notification published");
        Ok(())
    }
}

impl std::fmt::Debug for NatsNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsNotifier")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// `{endpoint}/channels/{channel}/socket`, tolerating a trailing slash.
fn socket_url(endpoint: &str, channel: &str) -> String {
    format!("{}/channels/{channel}/socket", endpoint.trim_end_matches('/'))
}
