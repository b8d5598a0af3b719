//! One [`SyncEngine`] per tier history, plus the loops that drive them.
//!
//! The hub owns every engine for a channel, routes recorded events to the
//! engine of their tier, runs the periodic soft update, and answers peer
//! `gachaUpdate` messages with a hard update of every engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use gacha_types::{GachaEvent, PeerMessage};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::broadcast::PeerNotifier;
use crate::engine::{SoftOutcome, SyncEngine, log_merge_error};
use crate::store::RemoteStore;

/// Totals from one pass over every engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Ids newly written to the store.
    pub written: usize,
    /// Engines whose merge failed.
    pub failed: usize,
}

/// Store key for a tier's history: `{prefix}:{channel}:tier:{slug}`.
///
/// The slug lowercases the label and collapses every run of characters
/// other than ASCII letters and digits into a single `-`.
pub fn history_key(prefix: &str, channel: &str, label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "tier" } else { slug };
    format!("{prefix}:{channel}:tier:{slug}")
}

/// Owns the per-tier engines of one channel.
#[derive(Debug)]
pub struct SyncHub {
    /// Tier label to history key.
    keys: BTreeMap<String, String>,
    /// History key to engine. Labels with the same slug share an engine.
    engines: BTreeMap<String, SyncEngine>,
    notifier: PeerNotifier,
}

impl SyncHub {
    /// Build one engine per distinct history key of `labels`.
    pub fn new<'a>(
        store: &RemoteStore,
        prefix: &str,
        channel: &str,
        labels: impl IntoIterator<Item = &'a str>,
        notifier: PeerNotifier,
    ) -> Self {
        let mut keys = BTreeMap::new();
        let mut engines = BTreeMap::new();
        for label in labels {
            let key = history_key(prefix, channel, label);
            engines
                .entry(key.clone())
                .or_insert_with(|| SyncEngine::new(store.clone(), key.clone()));
            keys.insert(label.to_owned(), key);
        }
        info!(
            engines = engines.len(),
            store = store.name(),
            notifier = notifier.name(),
            "sync hub ready"
        );
        Self {
            keys,
            engines,
            notifier,
        }
    }

    /// The engine tracking `label`'s history.
    pub fn engine(&self, label: &str) -> Option<&SyncEngine> {
        self.keys.get(label).and_then(|key| self.engines.get(key))
    }

    /// Iterate every engine in key order.
    pub fn engines(&self) -> impl Iterator<Item = &SyncEngine> {
        self.engines.values()
    }

    /// Append `event`'s id to its tier's local buffer.
    ///
    /// Returns `false` if the tier has no engine.
    pub fn record(&self, event: &GachaEvent) -> bool {
        let Some(engine) = self.engine(&event.tier.label) else {
            warn!(tier = %event.tier.label, event_id = %event.id, "no history for tier");
            return false;
        };
        engine.record(event.id.to_string());
        true
    }

    /// Load (or create) every history.
    pub async fn fetch_initial_all(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for engine in self.engines.values() {
            match engine.fetch_initial().await {
                Ok(len) => debug!(key = engine.key(), len, "history fetched"),
                Err(e) => {
                    log_merge_error(engine.key(), "fetch_initial", &e);
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }
        report
    }

    /// Soft-update every engine, then notify peers if anything was written.
    pub async fn soft_update_all(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for engine in self.engines.values() {
            match engine.soft_update().await {
                Ok(SoftOutcome::Appended { count }) => {
                    report.written = report.written.saturating_add(count);
                }
                Ok(SoftOutcome::Idle | SoftOutcome::UpToDate) => {}
                Err(e) => {
                    log_merge_error(engine.key(), "soft_update", &e);
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        if report.written > 0 {
            match self.notifier.notify().await {
                Ok(()) => debug!(notifier = self.notifier.name(), "peers notified"),
                Err(e) => warn!(notifier = self.notifier.name(), error = %e, "peer notification failed"),
            }
        }
        report
    }

    /// Hard-update every engine. Peers are not notified.
    pub async fn hard_update_all(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for engine in self.engines.values() {
            match engine.hard_update().await {
                Ok(added) => report.written = report.written.saturating_add(added),
                Err(e) => {
                    log_merge_error(engine.key(), "hard_update", &e);
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }
        report
    }

    /// React to one raw peer message.
    ///
    /// Returns the hard-update report, or `None` if the payload was not a
    /// peer message.
    pub async fn handle_peer_payload(&self, payload: &[u8]) -> Option<SyncReport> {
        match serde_json::from_slice::<PeerMessage>(payload) {
            Ok(PeerMessage::GachaUpdate) => {
                info!("peer requested gacha update");
                Some(self.hard_update_all().await)
            }
            Err(e) => {
                debug!(error = %e, "ignoring unrecognized peer payload");
                None
            }
        }
    }

    /// Soft-update every `period` until shutdown.
    ///
    /// The first update happens one full period after start.
    pub async fn run_soft_ticker(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        info!(period_secs = period.as_secs(), "soft update ticker started");

        loop {
            tokio::select! {
                biased;
                requested = stop_signal(&mut shutdown) => {
                    if !requested {
                        debug!("shutdown sender dropped");
                    }
                    break;
                }
                _ = interval.tick() => {
                    let report = self.soft_update_all().await;
                    debug!(written = report.written, failed = report.failed, "soft update pass");
                }
            }
        }
        info!("soft update ticker stopped");
    }

    /// Hard-update on every peer message from `payloads` until shutdown or
    /// until the stream ends.
    pub async fn run_peer_listener<S, P>(self: Arc<Self>, mut payloads: S, mut shutdown: watch::Receiver<bool>)
    where
        S: Stream<Item = P> + Unpin,
        P: AsRef<[u8]>,
    {
        info!("peer listener started");
        loop {
            tokio::select! {
                biased;
                requested = stop_signal(&mut shutdown) => {
                    if !requested {
                        debug!("shutdown sender dropped");
                    }
                    break;
                }
                payload = payloads.next() => {
                    let Some(payload) = payload else {
                        warn!("peer subscription ended");
                        break;
                    };
                    if let Some(report) = self.handle_peer_payload(payload.as_ref()).await {
                        debug!(written = report.written, failed = report.failed, "hard update pass");
                    }
                }
            }
        }
        info!("peer listener stopped");
    }
}

/// Resolves once shutdown is requested (`true`) or the sender is dropped (`false`).
///
/// Only a `bool` leaves this future, so no `watch::Ref` outlives the select.
async fn stop_signal(shutdown: &mut watch::Receiver<bool>) -> bool {
    shutdown.wait_for(|stop| *stop).await.is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use gacha_types::RewardTier;
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryStore;

    fn hub(memory: &MemoryStore) -> SyncHub {
        SyncHub::new(
            &RemoteStore::Memory(memory.clone()),
            "gacha",
            "chan",
            ["Common", "Super Rare!"],
            PeerNotifier::Disabled,
        )
    }

    fn event(label: &str) -> GachaEvent {
        GachaEvent::new(RewardTier::new(label, "x.png").with_duration(1.0), "viewer")
    }

    #[test]
    fn history_keys_are_slugged() {
        assert_eq!(history_key("gacha", "c", "Super Rare!"), "gacha:c:tier:super-rare");
        assert_eq!(history_key("gacha", "c", "  Tier   1 "), "gacha:c:tier:tier-1");
        assert_eq!(history_key("gacha", "c", "★★★"), "gacha:c:tier:tier");
    }

    #[test]
    fn record_routes_by_tier() {
        let memory = MemoryStore::new();
        let hub = hub(&memory);
        assert!(hub.record(&event("Common")));
        assert!(!hub.record(&event("Unknown")));
    }

    #[tokio::test]
    async fn soft_update_all_flushes_every_tier() {
        let memory = MemoryStore::new();
        let hub = hub(&memory);
        assert_eq!(hub.fetch_initial_all().await.failed, 0);

        let common = event("Common");
        let rare = event("Super Rare!");
        hub.record(&common);
        hub.record(&rare);
        hub.record(&event("Common"));

        let report = hub.soft_update_all().await;
        assert_eq!(report, SyncReport { written: 3, failed: 0 });

        let stored = memory.get("gacha:chan:tier:super-rare").unwrap().unwrap();
        assert_eq!(stored, json!([rare.id.to_string()]));
        assert_eq!(hub.engine("Common").unwrap().history().await.len(), 2);
    }

    #[tokio::test]
    async fn peer_payload_triggers_hard_update() {
        let memory = MemoryStore::new();
        let hub = hub(&memory);
        memory.set("gacha:chan:tier:common", json!(["remote"])).unwrap();
        let local = event("Common");
        hub.record(&local);

        let report = hub.handle_peer_payload(br#"{"type":"gachaUpdate"}"#).await;
        assert_eq!(report, Some(SyncReport { written: 1, failed: 0 }));
        assert_eq!(
            memory.get("gacha:chan:tier:common").unwrap().unwrap(),
            json!(["remote", local.id.to_string()])
        );

        assert_eq!(hub.handle_peer_payload(b"not json").await, None);
    }

    #[tokio::test]
    async fn failures_are_counted_per_engine() {
        let memory = MemoryStore::new();
        let hub = hub(&memory);
        memory.set("gacha:chan:tier:common", json!(42)).unwrap();
        hub.record(&event("Common"));
        hub.record(&event("Super Rare!"));

        let report = hub.soft_update_all().await;
        assert_eq!(report, SyncReport { written: 1, failed: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn soft_ticker_flushes_on_schedule_and_stops() {
        let memory = MemoryStore::new();
        let hub = Arc::new(hub(&memory));
        hub.record(&event("Common"));
        let (tx, rx) = watch::channel(false);

        let ticker = tokio::spawn(Arc::clone(&hub).run_soft_ticker(Duration::from_secs(900), rx));

        tokio::time::sleep(Duration::from_secs(899)).await;
        assert_eq!(hub.engine("Common").unwrap().pending().await, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hub.engine("Common").unwrap().pending().await, 0);

        tx.send(true).unwrap();
        ticker.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loops_run_on_spawned_tasks_and_stop_on_shutdown() {
        let memory = MemoryStore::new();
        let hub = Arc::new(hub(&memory));
        hub.record(&event("Common"));
        let (tx, rx) = watch::channel(false);
        let (peer_tx, peer_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
        let payloads = futures::stream::unfold(peer_rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        });
        let payloads = Box::pin(payloads);

        let ticker = tokio::spawn(Arc::clone(&hub).run_soft_ticker(Duration::from_secs(900), rx.clone()));
        let listener = tokio::spawn(Arc::clone(&hub).run_peer_listener(payloads, rx));

        peer_tx.send(br#"{"type":"gachaUpdate"}"#.to_vec()).unwrap();
        for _ in 0..200 {
            if hub.engine("Common").unwrap().pending().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hub.engine("Common").unwrap().pending().await, 0);

        tx.send(true).unwrap();
        ticker.await.unwrap();
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn peer_listener_drains_stream_then_stops() {
        let memory = MemoryStore::new();
        let hub = Arc::new(hub(&memory));
        hub.record(&event("Common"));
        let (_tx, rx) = watch::channel(false);

        let payloads = futures::stream::iter(vec![
            b"garbage".to_vec(),
            br#"{"type":"gachaUpdate"}"#.to_vec(),
        ]);
        Arc::clone(&hub).run_peer_listener(payloads, rx).await;

        assert_eq!(hub.engine("Common").unwrap().pending().await, 0);
    }
}
