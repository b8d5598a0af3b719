//! Media kinds and the fixed file-extension table.
//!
//! The overlay infers what kind of media a URL points at strictly from its
//! file extension. The table is closed: anything not listed is unknown and
//! callers must reject it rather than guess.
//!
//! | Kind  | Extensions |
//! |-------|------------|
//! | Image | apng, avif, gif, jpg, jpeg, jfif, pjpeg, pjp, png, svg, webp |
//! | Video | mp4, webm, ogv, mov |
//! | Audio | mp3, wav, ogg, oga, opus, weba, flac, aac, m4a |
//!
//! `mp4` is video only.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Extensions rendered as a still (or animated) image.
const IMAGE_EXTENSIONS: &[&str] = &[
    "apng", "avif", "gif", "jpg", "jpeg", "jfif", "pjpeg", "pjp", "png", "svg", "webp",
];

/// Extensions played through the video element.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogv", "mov"];

/// Extensions played through the audio element.
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "ogg", "oga", "opus", "weba", "flac", "aac", "m4a",
];

/// The kind of media a reward tier references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MediaKind {
    /// A still or animated image, shown for a configured duration.
    Image,
    /// A video, shown until it ends on its own.
    Video,
    /// An audio clip, only ever played alongside an image.
    Audio,
}

impl MediaKind {
    /// Classify a bare extension (without the dot). Case-insensitive.
    ///
    /// Returns `None` for extensions outside the table.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let ext = extension.to_ascii_lowercase();
        let ext = ext.as_str();
        if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(Self::Audio)
        } else {
            None
        }
    }

    /// Classify a media URL by the extension of its last path segment.
    ///
    /// Query strings and fragments are ignored, so
    /// `https://cdn.example/clip.webm?v=2` is a video.
    pub fn from_url(url: &str) -> Option<Self> {
        extension_of(url).and_then(Self::from_extension)
    }

    /// Lowercase name used in logs and wire messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl core::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the file extension of a URL's last path segment.
///
/// Returns `None` when the segment has no dot or ends with one.
pub fn extension_of(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() { None } else { Some(ext) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mp4_is_video_only() {
        assert_eq!(MediaKind::from_extension("mp4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_url("reward.mp4"), Some(MediaKind::Video));
    }

    #[test]
    fn every_table_entry_classifies() {
        for ext in IMAGE_EXTENSIONS {
            assert_eq!(MediaKind::from_extension(ext), Some(MediaKind::Image), "{ext}");
        }
        for ext in VIDEO_EXTENSIONS {
            assert_eq!(MediaKind::from_extension(ext), Some(MediaKind::Video), "{ext}");
        }
        for ext in AUDIO_EXTENSIONS {
            assert_eq!(MediaKind::from_extension(ext), Some(MediaKind::Audio), "{ext}");
        }
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert_eq!(MediaKind::from_url("https://cdn/x/LEGEND.PNG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_url("fanfare.Mp3"), Some(MediaKind::Audio));
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        assert_eq!(
            MediaKind::from_url("https://cdn.example/clip.webm?v=2#t=3"),
            Some(MediaKind::Video)
        );
    }

    #[test]
    fn unknown_or_missing_extension_is_none() {
        assert_eq!(MediaKind::from_url("https://cdn.example/reward.exe"), None);
        assert_eq!(MediaKind::from_url("https://cdn.example/reward"), None);
        assert_eq!(MediaKind::from_url("https://cdn.example.com/path/"), None);
        assert_eq!(MediaKind::from_url("trailing."), None);
    }
}
