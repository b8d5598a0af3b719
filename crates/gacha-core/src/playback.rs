//! Per-event playback state machine.
//!
//! ```text
//!          start()            MediaEnded(video) / Timer(Finish)
//!   Idle ----------> Playing ----------------------------------> Complete
//!     |                 |
//!     | invalid media   | MediaError / Cancel / SurfaceLost
//!     +-----------------+--------------------------------------> Failed
//! ```
//!
//! The machine is pure: [`Playback::start`] and [`Playback::handle`] return
//! the side effects to perform as [`Effect`] values, and the scheduler applies
//! them against a render surface. Timers are expressed as offsets from the
//! moment playback started, so tests can drive the machine without a clock.

use std::time::Duration;

use gacha_types::{MediaKind, RewardTier};

/// Default length of the image fade-in and fade-out ramps.
pub const DEFAULT_FADE: Duration = Duration::from_millis(1000);

/// Errors that resolve a playback as failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisplayError {
    /// Unknown extension, or an image without a positive duration.
    #[error("invalid media: {reason}")]
    InvalidMedia {
        /// What is wrong with the tier's media.
        reason: String,
    },

    /// The surface reported a media error while playing.
    #[error("{kind} playback failed: {detail}")]
    Playback {
        /// Element that failed.
        kind: MediaKind,
        /// Error detail reported by the surface.
        detail: String,
    },

    /// Shutdown was requested while the event was on screen.
    #[error("playback cancelled by shutdown")]
    Cancelled,

    /// `start` was called on a playback that already left `Idle`.
    #[error("playback already started")]
    AlreadyStarted,
}

impl DisplayError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidMedia {
            reason: reason.into(),
        }
    }
}

/// How a tier is presented, resolved from its media extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackPlan {
    /// Play the video until it ends.
    Video {
        /// Video URL.
        url: String,
    },
    /// Show the image for `duration`, optionally with an audio clip.
    Image {
        /// Image URL.
        url: String,
        /// Audio played alongside the image.
        audio: Option<String>,
        /// Total time on screen, fades included.
        duration: Duration,
    },
}

impl PlaybackPlan {
    /// Resolve the plan for a tier.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::InvalidMedia`] when the media extension is not
    /// an image or video, or an image has no finite, strictly positive
    /// duration.
    pub fn for_tier(tier: &RewardTier) -> Result<Self, DisplayError> {
        match MediaKind::from_url(&tier.media) {
            Some(MediaKind::Video) => Ok(Self::Video {
                url: tier.media.clone(),
            }),
            Some(MediaKind::Image) => {
                let duration = image_duration(tier.duration_secs)?;
                // Any companion source is handed to the audio element as is.
                let audio = tier
                    .audio
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_owned);
                Ok(Self::Image {
                    url: tier.media.clone(),
                    audio,
                    duration,
                })
            }
            Some(MediaKind::Audio) => Err(DisplayError::invalid(format!(
                "{} is audio; tiers must show an image or a video",
                tier.media
            ))),
            None => Err(DisplayError::invalid(format!(
                "{} has no recognized media extension",
                tier.media
            ))),
        }
    }

    /// The kind of the primary media element.
    pub const fn kind(&self) -> MediaKind {
        match self {
            Self::Video { .. } => MediaKind::Video,
            Self::Image { .. } => MediaKind::Image,
        }
    }
}

fn image_duration(seconds: Option<f64>) -> Result<Duration, DisplayError> {
    let secs = seconds.ok_or_else(|| DisplayError::invalid("image tier has no duration"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(DisplayError::invalid(format!(
            "image duration {secs} is not a positive number of seconds"
        )));
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(DisplayError::invalid(format!(
            "image duration {secs} is out of range"
        ))),
    }
}

/// Timer cues scheduled during image playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Begin fading the image out.
    FadeOut,
    /// The display duration has elapsed.
    Finish,
}

/// Discrete inputs that advance a playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// A scheduled cue fired.
    Timer(Cue),
    /// A media element reached its natural end.
    MediaEnded(MediaKind),
    /// A media element failed.
    MediaError {
        /// Element that failed.
        kind: MediaKind,
        /// Error detail from the surface.
        detail: String,
    },
    /// Shutdown was requested.
    Cancel,
    /// The surface can no longer report media signals.
    SurfaceLost,
}

/// A side effect to perform at a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Put the image on screen.
    ShowImage(String),
    /// Start the video from time zero.
    PlayVideo(String),
    /// Start the audio clip from time zero.
    PlayAudio(String),
    /// Ramp the image in over the given length.
    FadeIn(Duration),
    /// Ramp the image out over the given length.
    FadeOut(Duration),
    /// Deliver `cue` once `at` has elapsed since playback started.
    Schedule {
        /// Offset from playback start.
        at: Duration,
        /// Cue to deliver.
        cue: Cue,
    },
    /// Stop, rewind, and unset every media element.
    ClearAll,
}

/// Playback lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing started yet.
    Idle,
    /// Media of the given kind is on screen.
    Playing(MediaKind),
    /// Playback finished normally.
    Complete,
    /// Playback ended with an error.
    Failed(DisplayError),
}

/// State machine for a single gacha event.
#[derive(Debug, Clone)]
pub struct Playback {
    state: PlaybackState,
    fade: Duration,
    fade_out: Duration,
}

impl Playback {
    /// Create an idle playback using the given fade ramp length.
    pub const fn new(fade: Duration) -> Self {
        Self {
            state: PlaybackState::Idle,
            fade,
            fade_out: fade,
        }
    }

    /// Current state.
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// True once the playback reached `Complete` or `Failed`.
    pub const fn is_finished(&self) -> bool {
        matches!(self.state, PlaybackState::Complete | PlaybackState::Failed(_))
    }

    /// The completion result, once finished.
    pub fn outcome(&self) -> Option<Result<(), DisplayError>> {
        match &self.state {
            PlaybackState::Complete => Some(Ok(())),
            PlaybackState::Failed(err) => Some(Err(err.clone())),
            PlaybackState::Idle | PlaybackState::Playing(_) => None,
        }
    }

    /// Validate the tier and move to `Playing`.
    ///
    /// On validation failure the machine moves to `Failed` and no media
    /// effect is produced.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::InvalidMedia`] for unusable media and
    /// [`DisplayError::AlreadyStarted`] if the playback is not idle.
    pub fn start(&mut self, tier: &RewardTier) -> Result<Vec<Effect>, DisplayError> {
        if self.state != PlaybackState::Idle {
            return Err(DisplayError::AlreadyStarted);
        }

        let plan = match PlaybackPlan::for_tier(tier) {
            Ok(plan) => plan,
            Err(err) => {
                self.state = PlaybackState::Failed(err.clone());
                return Err(err);
            }
        };

        self.state = PlaybackState::Playing(plan.kind());
        let effects = match plan {
            PlaybackPlan::Video { url } => vec![Effect::PlayVideo(url)],
            PlaybackPlan::Image {
                url,
                audio,
                duration,
            } => {
                let fade_out_at = duration.saturating_sub(self.fade);
                self.fade_out = duration.saturating_sub(fade_out_at);

                let mut effects = Vec::with_capacity(5);
                if let Some(audio) = audio {
                    effects.push(Effect::PlayAudio(audio));
                }
                effects.push(Effect::ShowImage(url));
                effects.push(Effect::FadeIn(self.fade));
                effects.push(Effect::Schedule {
                    at: fade_out_at,
                    cue: Cue::FadeOut,
                });
                effects.push(Effect::Schedule {
                    at: duration,
                    cue: Cue::Finish,
                });
                effects
            }
        };
        Ok(effects)
    }

    /// Advance the machine with a signal.
    ///
    /// Signals that do not apply to the current state (stale timers, the
    /// audio clip ending before the image, anything after completion) are
    /// ignored and produce no effects.
    pub fn handle(&mut self, signal: PlaybackSignal) -> Vec<Effect> {
        let PlaybackState::Playing(kind) = self.state else {
            if self.state == PlaybackState::Idle && signal == PlaybackSignal::Cancel {
                self.state = PlaybackState::Failed(DisplayError::Cancelled);
            }
            return Vec::new();
        };

        match (kind, signal) {
            (MediaKind::Image, PlaybackSignal::Timer(Cue::FadeOut)) => {
                vec![Effect::FadeOut(self.fade_out)]
            }
            (MediaKind::Image, PlaybackSignal::Timer(Cue::Finish))
            | (MediaKind::Video, PlaybackSignal::MediaEnded(MediaKind::Video)) => {
                self.state = PlaybackState::Complete;
                vec![Effect::ClearAll]
            }
            (MediaKind::Image, PlaybackSignal::MediaError { kind: MediaKind::Image, detail })
            | (MediaKind::Video, PlaybackSignal::MediaError { kind: MediaKind::Video, detail }) => {
                self.state = PlaybackState::Failed(DisplayError::Playback { kind, detail });
                vec![Effect::ClearAll]
            }
            (_, PlaybackSignal::Cancel) => {
                self.state = PlaybackState::Failed(DisplayError::Cancelled);
                vec![Effect::ClearAll]
            }
            (_, PlaybackSignal::SurfaceLost) => {
                self.state = PlaybackState::Failed(DisplayError::Playback {
                    kind,
                    detail: "render surface disconnected".to_owned(),
                });
                vec![Effect::ClearAll]
            }
            _ => Vec::new(),
        }
    }
}

impl Default for Playback {
    fn default() -> Self {
        Self::new(DEFAULT_FADE)
    }
}
