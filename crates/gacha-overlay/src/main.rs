//! Overlay binary for the gacha reward mechanic.
//!
//! Wires the weight table, display scheduler, shared history sync, and chat
//! command intake together, then runs until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `gacha-config.yaml` (or `GACHA_CONFIG`)
//! 3. Build the weight table from the configured tiers
//! 4. Connect to NATS
//! 5. Connect the history store and peer notifier, fetch histories
//! 6. Start the render surface and display scheduler
//! 7. Start the soft-update ticker and peer listener
//! 8. Start chat and console command intake
//! 9. Wait for Ctrl-C, stop every task, flush pending history

mod error;
mod intake;
mod nats_surface;
mod service;

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt as _;
use gacha_core::command::CommandParser;
use gacha_core::config::{BroadcastMode, OverlayConfig, StoreBackend};
use gacha_core::queue::SharedQueue;
use gacha_core::scheduler::DisplayScheduler;
use gacha_sync::{
    DragonflyStore, HttpNotifier, MemoryStore, NatsNotifier, PeerNotifier, RemoteStore, SyncHub,
};
use gacha_types::wire::{chat_subject, peer_subject};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::OverlayError;
use crate::nats_surface::NatsSurface;
use crate::service::GachaService;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "gacha-config.yaml";

/// Application entry point for the overlay.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("gacha-overlay starting");

    // 2. Load configuration.
    let config_path = std::env::var("GACHA_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = OverlayConfig::load(&config_path).map_err(OverlayError::from)?;
    let channel = config.channel.id.clone();
    info!(
        path = %config_path.display(),
        channel = %channel,
        store = ?config.store.backend,
        broadcast = ?config.broadcast.mode,
        soft_interval_secs = config.sync.soft_interval_secs,
        "Configuration loaded"
    );

    // 3. Build the weight table.
    let table = config.weight_table().map_err(OverlayError::from)?;
    for (label, share) in table.shares() {
        info!(tier = label, share_pct = share * 100.0, "tier loaded");
    }

    // 4. Connect to NATS.
    let nats_url = &config.infrastructure.nats_url;
    info!(nats_url = %nats_url, "Connecting to NATS");
    let nats = async_nats::connect(nats_url.as_str())
        .await
        .map_err(|e| OverlayError::Nats {
            message: format!("failed to connect to {nats_url}: {e}"),
        })?;
    info!("NATS connection established");

    // 5. History store, peer notifier, and sync hub.
    let store = match config.store.backend {
        StoreBackend::Dragonfly => RemoteStore::Dragonfly(
            DragonflyStore::connect(&config.infrastructure.dragonfly_url)
                .await
                .map_err(OverlayError::from)?,
        ),
        StoreBackend::Memory => {
            warn!("using in-memory history store, histories are not shared");
            RemoteStore::Memory(MemoryStore::new())
        }
    };
    let notifier = match config.broadcast.mode {
        BroadcastMode::Http => PeerNotifier::Http(
            HttpNotifier::new(
                &config.broadcast.endpoint,
                &channel,
                config.broadcast.api_token.as_deref().unwrap_or_default(),
            )
            .map_err(OverlayError::from)?,
        ),
        BroadcastMode::Nats => PeerNotifier::Nats(NatsNotifier::new(nats.clone(), &channel)),
        BroadcastMode::Disabled => PeerNotifier::Disabled,
    };
    let hub = Arc::new(SyncHub::new(
        &store,
        &config.store.key_prefix,
        &channel,
        table.entries().iter().map(|entry| entry.tier.label.as_str()),
        notifier,
    ));
    let fetched = hub.fetch_initial_all().await;
    if fetched.failed > 0 {
        warn!(failed = fetched.failed, "some histories could not be loaded");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 6. Render surface and display scheduler.
    let (surface, signals, publisher_handle) =
        NatsSurface::start(nats.clone(), &channel, shutdown_rx.clone()).await?;
    let queue = SharedQueue::new();
    let scheduler = DisplayScheduler::new(
        surface,
        queue.clone(),
        signals,
        shutdown_rx.clone(),
        config.display.fade(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    // 7. Soft ticker and peer listener.
    let ticker_handle = tokio::spawn(
        Arc::clone(&hub).run_soft_ticker(config.sync.soft_interval(), shutdown_rx.clone()),
    );
    let peer = peer_subject(&channel);
    let peer_sub = nats
        .subscribe(peer.clone())
        .await
        .map_err(|e| OverlayError::Nats {
            message: format!("failed to subscribe to {peer}: {e}"),
        })?;
    let listener_handle = tokio::spawn(Arc::clone(&hub).run_peer_listener(
        peer_sub.map(|msg| msg.payload),
        shutdown_rx.clone(),
    ));

    // 8. Command intake.
    let service = Arc::new(GachaService::new(
        table,
        StdRng::from_os_rng(),
        queue,
        Arc::clone(&hub),
        CommandParser::new(config.commands.max_roll_count),
    ));
    let chat = chat_subject(&channel);
    let chat_sub = nats
        .subscribe(chat.clone())
        .await
        .map_err(|e| OverlayError::Nats {
            message: format!("failed to subscribe to {chat}: {e}"),
        })?;
    let chat_handle = tokio::spawn(intake::run_chat(
        Arc::clone(&service),
        chat_sub.map(|msg| msg.payload),
        shutdown_rx.clone(),
    ));
    let console_handle = tokio::spawn(intake::run_console(
        Arc::clone(&service),
        intake::console_lines(),
        shutdown_rx,
    ));
    info!(
        chat_subject = %chat,
        max_roll_count = config.commands.max_roll_count,
        "gacha-overlay ready, type +roll <name> or +rollcount <n>"
    );

    // 9. Run until Ctrl-C.
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    info!("shutdown requested");
    if shutdown_tx.send(true).is_err() {
        warn!("every task already stopped before shutdown was signalled");
    }

    let stats = scheduler_handle.await.unwrap_or_else(|e| {
        warn!(error = %e, "display scheduler ended abnormally");
        gacha_core::scheduler::SchedulerStats::default()
    });
    for (name, handle) in [
        ("render publisher", publisher_handle),
        ("soft ticker", ticker_handle),
        ("peer listener", listener_handle),
        ("chat intake", chat_handle),
        ("console intake", console_handle),
    ] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "task ended abnormally");
        }
    }

    let flushed = hub.soft_update_all().await;
    info!(
        completed = stats.completed,
        failed = stats.failed,
        flushed = flushed.written,
        "gacha-overlay shutdown complete"
    );

    Ok(())
}
