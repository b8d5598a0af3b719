//! Display scheduler: plays queued gacha events one at a time.
//!
//! The scheduler owns the consumer side of the [`SharedQueue`]. It never
//! dequeues the next event until the current one resolved `Complete` or
//! `Failed`; this is the only backpressure in the pipeline. Failures are
//! logged and the loop moves on.
//!
//! Time comes from [`tokio::time`], so tests run against the paused virtual
//! clock (`#[tokio::test(start_paused = true)]`). Shutdown is a
//! [`watch`] flag observed only between state transitions: the event on
//! screen is cleared, resolves [`DisplayError::Cancelled`], and no timer is
//! left pending.

use std::time::Duration;

use gacha_types::{EventId, GachaEvent, MediaSignal, RenderCommand};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::playback::{Cue, DisplayError, Effect, Playback, PlaybackSignal};
use crate::queue::SharedQueue;

/// Where render commands go.
///
/// Implementations must not block: the browser overlay surface forwards
/// commands onto a channel, the test surface records them.
pub trait RenderSurface: Send {
    /// Perform one render command.
    fn render(&mut self, command: RenderCommand);
}

/// Counters reported when the scheduler loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Events that played to completion.
    pub completed: u64,
    /// Events that failed (invalid media or playback errors).
    pub failed: u64,
}

/// What woke the playback loop.
enum Wake {
    Shutdown,
    Timer(usize),
    Signal(Option<MediaSignal>),
}

/// Consumes the event queue and drives one [`Playback`] at a time.
pub struct DisplayScheduler<S> {
    surface: S,
    queue: SharedQueue<GachaEvent>,
    signals: mpsc::UnboundedReceiver<MediaSignal>,
    signals_open: bool,
    shutdown: watch::Receiver<bool>,
    fade: Duration,
}

impl<S: RenderSurface> DisplayScheduler<S> {
    /// Create a scheduler.
    ///
    /// `signals` carries media feedback from the surface; `shutdown` flips to
    /// `true` to request a clean stop.
    pub const fn new(
        surface: S,
        queue: SharedQueue<GachaEvent>,
        signals: mpsc::UnboundedReceiver<MediaSignal>,
        shutdown: watch::Receiver<bool>,
        fade: Duration,
    ) -> Self {
        Self {
            surface,
            queue,
            signals,
            signals_open: true,
            shutdown,
            fade,
        }
    }

    /// Borrow the render surface.
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    /// Run until shutdown, playing events in queue order.
    pub async fn run(mut self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        info!("display scheduler started");

        loop {
            let event = tokio::select! {
                biased;
                () = shutdown_requested(&mut self.shutdown) => break,
                event = self.queue.pop() => event,
            };

            info!(
                event_id = %event.id,
                tier = %event.tier.label,
                requested_by = %event.requested_by,
                queued = self.queue.len(),
                "playing gacha event"
            );

            match self.play(&event).await {
                Ok(()) => {
                    stats.completed = stats.completed.saturating_add(1);
                    debug!(event_id = %event.id, "gacha event complete");
                }
                Err(DisplayError::Cancelled) => {
                    stats.failed = stats.failed.saturating_add(1);
                    info!(event_id = %event.id, "playback cancelled by shutdown");
                    break;
                }
                Err(e) => {
                    stats.failed = stats.failed.saturating_add(1);
                    warn!(
                        event_id = %event.id,
                        tier = %event.tier.label,
                        error = %e,
                        "gacha event failed, advancing"
                    );
                }
            }
        }

        info!(
            completed = stats.completed,
            failed = stats.failed,
            pending = self.queue.len(),
            "display scheduler stopped"
        );
        stats
    }

    /// Play a single event to completion.
    ///
    /// Returns exactly one result per event. Validation failures return
    /// before anything is rendered.
    ///
    /// # Errors
    ///
    /// Returns the [`DisplayError`] the playback resolved with.
    pub async fn play(&mut self, event: &GachaEvent) -> Result<(), DisplayError> {
        let started = Instant::now();
        let mut playback = Playback::new(self.fade);
        let mut timers: Vec<(Instant, Cue)> = Vec::new();

        if *self.shutdown.borrow() {
            return Err(DisplayError::Cancelled);
        }

        let effects = playback.start(&event.tier)?;
        self.apply(event.id, started, effects, &mut timers);

        while !playback.is_finished() {
            if !self.signals_open && timers.is_empty() {
                // Nothing left that could ever advance this playback.
                let effects = playback.handle(PlaybackSignal::SurfaceLost);
                self.apply(event.id, started, effects, &mut timers);
                continue;
            }

            let next_timer = timers
                .iter()
                .enumerate()
                .min_by_key(|(_, (at, _))| *at)
                .map(|(index, (at, _))| (index, *at));

            let wake = tokio::select! {
                biased;
                () = shutdown_requested(&mut self.shutdown) => Wake::Shutdown,
                () = sleep_until(next_timer.map_or(started, |(_, at)| at)), if next_timer.is_some() => {
                    Wake::Timer(next_timer.map_or(0, |(index, _)| index))
                }
                signal = self.signals.recv(), if self.signals_open => Wake::Signal(signal),
            };

            let signal = match wake {
                Wake::Shutdown => PlaybackSignal::Cancel,
                Wake::Timer(index) => {
                    let (_, cue) = timers.swap_remove(index);
                    PlaybackSignal::Timer(cue)
                }
                Wake::Signal(Some(signal)) => {
                    if signal.event_id() != event.id {
                        debug!(
                            event_id = %event.id,
                            stale_event_id = %signal.event_id(),
                            "ignoring media signal for another event"
                        );
                        continue;
                    }
                    to_playback_signal(signal)
                }
                Wake::Signal(None) => {
                    warn!("media signal channel closed");
                    self.signals_open = false;
                    continue;
                }
            };

            if let PlaybackSignal::MediaError { kind, detail } = &signal {
                debug!(event_id = %event.id, %kind, %detail, "media error reported");
            }

            let effects = playback.handle(signal);
            self.apply(event.id, started, effects, &mut timers);
        }

        playback.outcome().unwrap_or(Err(DisplayError::Cancelled))
    }

    /// Send render effects to the surface and register scheduled cues.
    fn apply(
        &mut self,
        event_id: EventId,
        started: Instant,
        effects: Vec<Effect>,
        timers: &mut Vec<(Instant, Cue)>,
    ) {
        for effect in effects {
            let command = match effect {
                Effect::Schedule { at, cue } => {
                    timers.push((started.checked_add(at).unwrap_or(started), cue));
                    continue;
                }
                Effect::ShowImage(url) => RenderCommand::ShowImage { event_id, url },
                Effect::PlayVideo(url) => RenderCommand::PlayVideo { event_id, url },
                Effect::PlayAudio(url) => RenderCommand::PlayAudio { event_id, url },
                Effect::FadeIn(ramp) => RenderCommand::FadeIn {
                    event_id,
                    duration_ms: millis(ramp),
                },
                Effect::FadeOut(ramp) => RenderCommand::FadeOut {
                    event_id,
                    duration_ms: millis(ramp),
                },
                Effect::ClearAll => {
                    timers.clear();
                    RenderCommand::Clear { event_id }
                }
            };
            self.surface.render(command);
        }
    }
}

fn to_playback_signal(signal: MediaSignal) -> PlaybackSignal {
    match signal {
        MediaSignal::Ended { kind, .. } => PlaybackSignal::MediaEnded(kind),
        MediaSignal::Error { kind, detail, .. } => PlaybackSignal::MediaError { kind, detail },
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves once the shutdown flag is `true`; never if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
