//! yt-dlp format selector strings
//!
//! Maps a quality preference, a container preference and the audio-only flag
//! to the selector expression understood by `yt-dlp -f`. Every chain ends in
//! progressively looser alternatives so that a request never fails only
//! because no stream matches the preferred container.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Height cap applied to "best" requests that prefer mp4.
pub const BEST_HEIGHT_CAP: u32 = 1080;

/// Preferred output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Webm,
    Mkv,
    Any,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
            Container::Mkv => "mkv",
            Container::Any => "any",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Container::Mp4),
            "webm" => Ok(Container::Webm),
            "mkv" => Ok(Container::Mkv),
            "any" => Ok(Container::Any),
            other => Err(format!("unknown container: {}", other)),
        }
    }
}

/// Stateless selector builder
pub struct FormatSelector;

impl FormatSelector {
    /// Build the `-f` expression for the given preferences.
    ///
    /// `quality` is `"best"`, `"worst"` or a height such as `"720p"`. Anything
    /// else goes through the height branch verbatim; a non-numeric height is
    /// left for yt-dlp to reject.
    pub fn select(quality: &str, container: Container, audio_only: bool) -> String {
        if audio_only {
            return match container {
                Container::Mp4 => "ba[ext=m4a]/ba/b".to_string(),
                Container::Webm => "ba[ext=webm]/ba/b".to_string(),
                Container::Mkv | Container::Any => "ba/b".to_string(),
            };
        }

        match quality {
            "best" => match container {
                Container::Mp4 => format!(
                    "bv*[ext=mp4][height<={cap}]+ba[ext=m4a]/bv*[height<={cap}]+ba/b[height<={cap}]/b",
                    cap = BEST_HEIGHT_CAP
                ),
                Container::Webm => "bv*[ext=webm]+ba[ext=webm]/bv*+ba/b".to_string(),
                Container::Mkv => "bv*+ba/b".to_string(),
                Container::Any => "bv*[ext=mp4]+ba[ext=m4a]/bv*+ba/b".to_string(),
            },
            "worst" => "wv*+wa/w".to_string(),
            other => {
                let height = Self::height_of(other);
                match container {
                    Container::Mp4 => format!(
                        "bv*[height<={h}][ext=mp4]+ba[ext=m4a]/bv*[height<={h}]+ba/b[height<={h}]/b",
                        h = height
                    ),
                    Container::Webm => format!(
                        "bv*[height<={h}][ext=webm]+ba[ext=webm]/bv*[height<={h}]+ba/b[height<={h}]/b",
                        h = height
                    ),
                    Container::Mkv | Container::Any => {
                        format!("bv*[height<={h}]+ba/b[height<={h}]/b", h = height)
                    }
                }
            }
        }
    }

    /// Container to request as the merge output, if any.
    pub fn merge_output_format(
        quality: &str,
        container: Container,
        audio_only: bool,
    ) -> Option<Container> {
        if audio_only || quality == "worst" {
            return None;
        }
        match (quality, container) {
            ("best", Container::Any) => Some(Container::Mp4),
            (_, Container::Any) => None,
            (_, c) => Some(c),
        }
    }

    /// Height part of a `"<N>p"` quality string.
    pub fn height_of(quality: &str) -> &str {
        let q = quality.trim();
        q.strip_suffix('p')
            .or_else(|| q.strip_suffix('P'))
            .unwrap_or(q)
    }
}
