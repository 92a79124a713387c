//! Application configuration

use crate::downloader::Container;
use crate::utils::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound on the worker pool
pub const MAX_CONCURRENT_DOWNLOADS: usize = 16;

/// Application settings, persisted as a flat JSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Download location
    pub output_dir: PathBuf,

    /// "best", "worst" or a height such as "720p"
    pub quality: String,

    /// Preferred container
    pub format_preference: Container,

    /// Download audio streams only
    pub audio_only: bool,

    /// Request English subtitles alongside derived-format downloads
    pub include_subtitles: bool,

    /// Size of the worker pool
    pub concurrent_downloads: usize,

    /// Place files under a playlist/uploader folder
    pub organize_in_folders: bool,

    /// Write an info-json sidecar next to each download
    pub save_metadata: bool,

    /// Keys written by other tools, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: paths::default_output_dir(),
            quality: "best".to_string(),
            format_preference: Container::Mp4,
            audio_only: false,
            include_subtitles: false,
            concurrent_downloads: 3,
            organize_in_folders: false,
            save_metadata: false,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Load from the default per-user location.
    pub fn load() -> Self {
        Self::load_from(&paths::settings_file())
    }

    /// Load from `path`. A missing, unreadable or corrupt file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Self::default();
        }

        let loaded = std::fs::read_to_string(path)
            .context("Failed to read settings file")
            .and_then(|json| {
                serde_json::from_str::<Settings>(&json).context("Failed to parse settings file")
            });

        match loaded {
            Ok(settings) => settings.normalized(),
            Err(e) => {
                warn!("{:#} ({:?}); using defaults", e, path);
                Self::default()
            }
        }
    }

    /// Persist to the default per-user location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&paths::settings_file())
    }

    /// Persist to `path` as pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Clamp values into usable ranges.
    pub fn normalized(mut self) -> Self {
        if !(1..=MAX_CONCURRENT_DOWNLOADS).contains(&self.concurrent_downloads) {
            let clamped = self.concurrent_downloads.clamp(1, MAX_CONCURRENT_DOWNLOADS);
            warn!(
                "concurrent_downloads {} out of range, using {}",
                self.concurrent_downloads, clamped
            );
            self.concurrent_downloads = clamped;
        }
        if self.quality.trim().is_empty() {
            self.quality = "best".to_string();
        }
        self
    }
}
