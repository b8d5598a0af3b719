//! Integration tests for the display pipeline.
//!
//! Every test runs on tokio's paused clock, so a 10 second image plays in
//! microseconds of wall time and timestamps are exact virtual offsets.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects,
    clippy::missing_panics_doc
)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gacha_core::playback::{DEFAULT_FADE, DisplayError};
use gacha_core::queue::SharedQueue;
use gacha_core::scheduler::{DisplayScheduler, RenderSurface};
use gacha_core::selector::WeightTable;
use gacha_types::{EventId, GachaEvent, MediaKind, MediaSignal, RenderCommand, RewardTier, WeightedEntry};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// How the fake overlay answers a `PlayVideo`.
#[derive(Clone)]
enum VideoReply {
    Silent,
    EndAfter(Duration),
    Fail(&'static str),
}

const DRAWS: usize = 10_000;

type Log = Arc<Mutex<Vec<(Duration, RenderCommand)>>>;

/// Records every command with its virtual offset from `origin`.
struct RecordingSurface {
    origin: Instant,
    log: Log,
    signals: mpsc::UnboundedSender<MediaSignal>,
    video: VideoReply,
}

impl RenderSurface for RecordingSurface {
    fn render(&mut self, command: RenderCommand) {
        if let RenderCommand::PlayVideo { event_id, .. } = &command {
            let event_id = *event_id;
            let tx = self.signals.clone();
            match self.video.clone() {
                VideoReply::Silent => {}
                VideoReply::EndAfter(after) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(MediaSignal::Ended {
                            event_id,
                            kind: MediaKind::Video,
                        });
                    });
                }
                VideoReply::Fail(detail) => {
                    let _ = tx.send(MediaSignal::Error {
                        event_id,
                        kind: MediaKind::Video,
                        detail: detail.to_owned(),
                    });
                }
            }
        }
        self.log
            .lock()
            .unwrap()
            .push((self.origin.elapsed(), command));
    }
}

struct Harness {
    scheduler: DisplayScheduler<RecordingSurface>,
    queue: SharedQueue<GachaEvent>,
    log: Log,
    signals: mpsc::UnboundedSender<MediaSignal>,
    shutdown: watch::Sender<bool>,
}

fn harness(video: VideoReply) -> Harness {
    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let queue = SharedQueue::new();
    let log: Log = Arc::default();
    let surface = RecordingSurface {
        origin: Instant::now(),
        log: Arc::clone(&log),
        signals: signals_tx.clone(),
        video,
    };
    let scheduler =
        DisplayScheduler::new(surface, queue.clone(), signals_rx, shutdown_rx, DEFAULT_FADE);
    Harness {
        scheduler,
        queue,
        log,
        signals: signals_tx,
        shutdown: shutdown_tx,
    }
}

fn image(label: &str, seconds: f64) -> GachaEvent {
    let tier = RewardTier::new(label, format!("https://cdn/{label}.png")).with_duration(seconds);
    GachaEvent::new(tier, "tester")
}

fn video(label: &str) -> GachaEvent {
    GachaEvent::new(RewardTier::new(label, format!("https://cdn/{label}.webm")), "tester")
}

fn entries(log: &Log) -> Vec<(Duration, RenderCommand)> {
    log.lock().unwrap().clone()
}

#[tokio::test(start_paused = true)]
async fn image_timeline_fades_in_out_and_clears() {
    let mut h = harness(VideoReply::Silent);
    let tier = RewardTier::new("gold", "https://cdn/gold.png")
        .with_audio("https://cdn/gold.mp3")
        .with_duration(10.0);
    let event = GachaEvent::new(tier, "tester");
    let id = event.id;

    h.scheduler.play(&event).await.unwrap();

    let log = entries(&h.log);
    let commands: Vec<&RenderCommand> = log.iter().map(|(_, c)| c).collect();
    assert_eq!(
        commands,
        vec![
            &RenderCommand::PlayAudio {
                event_id: id,
                url: "https://cdn/gold.mp3".to_owned()
            },
            &RenderCommand::ShowImage {
                event_id: id,
                url: "https://cdn/gold.png".to_owned()
            },
            &RenderCommand::FadeIn {
                event_id: id,
                duration_ms: 1000
            },
            &RenderCommand::FadeOut {
                event_id: id,
                duration_ms: 1000
            },
            &RenderCommand::Clear { event_id: id },
        ]
    );

    let at = |i: usize| log[i].0;
    assert_eq!(at(0), Duration::ZERO);
    assert_eq!(at(2), Duration::ZERO);
    assert!(at(3) >= Duration::from_secs(9) && at(3) < Duration::from_millis(9_010));
    assert!(at(4) >= Duration::from_secs(10) && at(4) < Duration::from_millis(10_010));
}

#[tokio::test(start_paused = true)]
async fn video_completes_when_surface_reports_end() {
    let mut h = harness(VideoReply::EndAfter(Duration::from_secs(4)));
    let event = video("rare");

    h.scheduler.play(&event).await.unwrap();

    let log = entries(&h.log);
    assert_eq!(log.len(), 2);
    assert!(matches!(log[0].1, RenderCommand::PlayVideo { .. }));
    assert_eq!(log[1].1, RenderCommand::Clear { event_id: event.id });
    assert!(log[1].0 >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn video_error_fails_and_clears() {
    let mut h = harness(VideoReply::Fail("decode error"));
    let event = video("broken");

    let err = h.scheduler.play(&event).await.unwrap_err();
    assert_eq!(
        err,
        DisplayError::Playback {
            kind: MediaKind::Video,
            detail: "decode error".to_owned()
        }
    );
    let log = entries(&h.log);
    assert_eq!(log.last().unwrap().1, RenderCommand::Clear { event_id: event.id });
}

#[tokio::test(start_paused = true)]
async fn stale_signals_are_ignored() {
    let mut h = harness(VideoReply::EndAfter(Duration::from_secs(2)));
    h.signals
        .send(MediaSignal::Ended {
            event_id: EventId::new(),
            kind: MediaKind::Video,
        })
        .unwrap();
    let event = video("late");

    h.scheduler.play(&event).await.unwrap();

    let log = entries(&h.log);
    assert!(log[1].0 >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn invalid_duration_renders_nothing() {
    let mut h = harness(VideoReply::Silent);
    for seconds in [0.0, -3.0, f64::NAN, f64::INFINITY] {
        let err = h.scheduler.play(&image("bad", seconds)).await.unwrap_err();
        assert!(matches!(err, DisplayError::InvalidMedia { .. }), "{seconds}");
    }
    let missing = GachaEvent::new(RewardTier::new("none", "none.png"), "tester");
    let err = h.scheduler.play(&missing).await.unwrap_err();
    assert!(matches!(err, DisplayError::InvalidMedia { .. }));

    let unknown = GachaEvent::new(RewardTier::new("doc", "readme.txt"), "tester");
    let err = h.scheduler.play(&unknown).await.unwrap_err();
    assert!(matches!(err, DisplayError::InvalidMedia { .. }));

    assert!(entries(&h.log).is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_plays_events_one_at_a_time() {
    let h = harness(VideoReply::Silent);
    let first = image("first", 2.0);
    let second = image("second", 3.0);
    h.queue.push(first.clone());
    h.queue.push(second.clone());

    let handle = tokio::spawn(h.scheduler.run());
    tokio::time::sleep(Duration::from_secs(6)).await;
    h.shutdown.send(true).unwrap();
    let stats = handle.await.unwrap();

    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 0);

    let log = entries(&h.log);
    let first_clear = log
        .iter()
        .position(|(_, c)| *c == RenderCommand::Clear { event_id: first.id })
        .unwrap();
    let second_show = log
        .iter()
        .position(|(_, c)| matches!(c, RenderCommand::ShowImage { event_id, .. } if *event_id == second.id))
        .unwrap();
    assert!(first_clear < second_show);
    assert!(log[second_show].0 >= Duration::from_secs(2));
    assert!(log.last().unwrap().0 >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_current_event_and_leaves_queue() {
    let h = harness(VideoReply::Silent);
    let current = image("current", 10.0);
    h.queue.push(current.clone());
    h.queue.push(image("waiting", 10.0));

    let handle = tokio::spawn(h.scheduler.run());
    tokio::time::sleep(Duration::from_secs(3)).await;
    h.shutdown.send(true).unwrap();
    let stats = handle.await.unwrap();

    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(h.queue.len(), 1);

    let log = entries(&h.log);
    let (at, last) = log.last().unwrap();
    assert_eq!(*last, RenderCommand::Clear { event_id: current.id });
    assert!(*at >= Duration::from_secs(3) && *at < Duration::from_secs(4));
    assert!(!log.iter().any(|(_, c)| matches!(c, RenderCommand::FadeOut { .. })));
}

#[tokio::test(start_paused = true)]
async fn closed_signal_channel_fails_a_silent_video() {
    let (tx, rx) = mpsc::unbounded_channel::<MediaSignal>();
    drop(tx);
    let (unused_tx, _unused_rx) = mpsc::unbounded_channel();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let log: Log = Arc::default();
    let surface = RecordingSurface {
        origin: Instant::now(),
        log: Arc::clone(&log),
        signals: unused_tx,
        video: VideoReply::Silent,
    };
    let mut scheduler =
        DisplayScheduler::new(surface, SharedQueue::new(), rx, shutdown_rx, DEFAULT_FADE);

    let event = video("orphan");
    let err = scheduler.play(&event).await.unwrap_err();
    assert!(matches!(err, DisplayError::Playback { .. }));
    assert_eq!(
        entries(&log).last().unwrap().1,
        RenderCommand::Clear { event_id: event.id }
    );
}

#[tokio::test]
async fn cumulative_one_four_ten_end_to_end() {
    let table = WeightTable::new(vec![
        WeightedEntry::new(1.0, RewardTier::new("A", "a.png").with_duration(1.0)),
        WeightedEntry::new(4.0, RewardTier::new("B", "b.png").with_duration(1.0)),
        WeightedEntry::new(10.0, RewardTier::new("C", "c.webm")),
    ])
    .unwrap();
    let queue: SharedQueue<GachaEvent> = SharedQueue::new();
    let mut rng = StdRng::seed_from_u64(0x0001_040A);

    for _ in 0..DRAWS {
        let tier = table.select(&mut rng).unwrap().clone();
        queue.push(GachaEvent::new(tier, "viewer"));
    }

    let mut counts = [0_usize; 3];
    while let Some(event) = queue.try_pop() {
        let slot = match event.tier.label.as_str() {
            "A" => 0,
            "B" => 1,
            _ => 2,
        };
        counts[slot] += 1;
    }

    let share = |n: usize| n as f64 / DRAWS as f64;
    assert!((share(counts[0]) - 0.1).abs() < 0.02, "{counts:?}");
    assert!((share(counts[1]) - 0.3).abs() < 0.02, "{counts:?}");
    assert!((share(counts[2]) - 0.6).abs() < 0.02, "{counts:?}");
}
