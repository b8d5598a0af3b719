//! Render surface backed by NATS.
//!
//! The browser overlay subscribes to `gacha.{channel}.render` and performs
//! each [`RenderCommand`] against its media elements. It reports playback
//! feedback on `gacha.{channel}.media` as [`MediaSignal`]s.
//!
//! [`RenderSurface::render`] is synchronous, so commands go through an
//! unbounded channel to a single publisher task. One publisher keeps the
//! commands of an event in order on the wire. The publisher ends once the
//! surface is dropped, flushing whatever is still buffered so the final
//! clear reaches the overlay.

use futures::StreamExt as _;
use gacha_core::scheduler::RenderSurface;
use gacha_types::wire::{media_subject, render_subject};
use gacha_types::{MediaSignal, RenderCommand};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::OverlayError;

/// A [`RenderSurface`] that publishes commands to the browser overlay.
#[derive(Debug)]
pub struct NatsSurface {
    commands: mpsc::UnboundedSender<RenderCommand>,
}

impl NatsSurface {
    /// Start the publisher and media-signal tasks for `channel`.
    ///
    /// Returns the surface, the receiver the scheduler reads media signals
    /// from, and the publisher task. The signal receiver closes when the media
    /// subscription ends or `shutdown` fires. Await the publisher after the
    /// surface is dropped to be sure every command left the process.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Nats`] if the media subscription fails.
    pub async fn start(
        client: async_nats::Client,
        channel: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<MediaSignal>, JoinHandle<()>), OverlayError> {
        let render = render_subject(channel);
        let media = media_subject(channel);

        let mut media_sub = client
            .subscribe(media.clone())
            .await
            .map_err(|e| OverlayError::Nats {
                message: format!("failed to subscribe to {media}: {e}"),
            })?;
        info!(subject = %media, "subscribed to media signals");

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<RenderCommand>();
        let publisher = client;
        let publisher_handle = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let payload = match serde_json::to_vec(&command) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize render command");
                        continue;
                    }
                };
                if let Err(e) = publisher.publish(render.clone(), payload.into()).await {
                    warn!(subject = %render, error = %e, "failed to publish render command");
                }
            }
            if let Err(e) = publisher.flush().await {
                warn!(subject = %render, error = %e, "failed to flush render commands");
            }
            debug!("render publisher stopped");
        });

        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<MediaSignal>();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => break,
                    msg = media_sub.next() => {
                        let Some(msg) = msg else {
                            warn!("media signal subscription ended");
                            break;
                        };
                        match serde_json::from_slice::<MediaSignal>(&msg.payload) {
                            Ok(signal) => {
                                if signal_tx.send(signal).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "failed to deserialize media signal"),
                        }
                    }
                }
            }
            debug!("media signal forwarder stopped");
        });

        Ok((Self { commands: command_tx }, signal_rx, publisher_handle))
    }
}

impl RenderSurface for NatsSurface {
    fn render(&mut self, command: RenderCommand) {
        if self.commands.send(command).is_err() {
            warn!("render publisher is gone, dropping command");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use gacha_types::EventId;

    use super::*;

    #[tokio::test]
    #[ignore = "requires live NATS server at NATS_URL"]
    async fn last_command_is_delivered_once_surface_drops() {
        let url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_owned());
        let channel = format!("surface-{}", std::process::id());
        let overlay = async_nats::connect(&url).await.expect("failed to connect to NATS");
        let mut commands = overlay.subscribe(render_subject(&channel)).await.unwrap();
        overlay.flush().await.unwrap();

        let client = async_nats::connect(&url).await.expect("failed to connect to NATS");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (mut surface, _signals, publisher) =
            NatsSurface::start(client, &channel, shutdown_rx).await.unwrap();
        let clear = RenderCommand::Clear {
            event_id: EventId::new(),
        };
        surface.render(clear.clone());
        drop(surface);
        publisher.await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), commands.next())
            .await
            .expect("render command not delivered")
            .unwrap();
        let command: RenderCommand = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(command, clear);
    }
}
