//! Content analysis: turn a URL into a previewable list of items

use crate::extractor::models::MediaInfo;
use crate::extractor::traits::MediaBackend;
use crate::utils::error::{short_message, VideoloaderError};
use crate::utils::validation::validate_url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default cap on entries resolved for a preview.
pub const DEFAULT_ENTRY_LIMIT: usize = 50;

const FAILURE_MESSAGE_LIMIT: usize = 120;

/// What an analyzed URL turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Single,
    Playlist,
    /// Channel or any other multi-entry grouping that is not tagged a playlist
    Channel,
}

impl ContentKind {
    pub fn is_collection(&self) -> bool {
        !matches!(self, ContentKind::Single)
    }
}

/// One selectable entry of an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewItem {
    pub url: String,
    pub title: String,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub selected: bool,
}

impl PreviewItem {
    /// Title with the duration appended, e.g. `"Intro (3:07)"`.
    pub fn display_title(&self) -> String {
        match self.duration.and_then(format_duration) {
            Some(d) => format!("{} ({})", self.title, d),
            None => self.title.clone(),
        }
    }
}

/// Result of analyzing a URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub kind: ContentKind,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub items: Vec<PreviewItem>,
}

impl ContentDescriptor {
    /// Label shown above the preview list.
    pub fn label(&self) -> String {
        match self.kind {
            ContentKind::Single => "Single Video".to_string(),
            ContentKind::Playlist => format!("Playlist ({} videos)", self.items.len()),
            ContentKind::Channel => format!("Channel/Collection ({} videos)", self.items.len()),
        }
    }

    /// Classify flat metadata.
    ///
    /// More than one present entry makes a collection; zero or one entry is a
    /// single item. A lone entry describes itself, falling back to the
    /// top-level fields it lacks.
    pub fn from_info(info: &MediaInfo, requested_url: &str) -> Self {
        let entries: Vec<&MediaInfo> = info.present_entries().collect();

        if entries.len() > 1 {
            let kind = if info.is_playlist() {
                ContentKind::Playlist
            } else {
                ContentKind::Channel
            };
            let items = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| PreviewItem {
                    url: entry.page_url().unwrap_or_default().to_string(),
                    title: entry
                        .title
                        .clone()
                        .unwrap_or_else(|| format!("Video {}", i + 1)),
                    duration: entry.duration,
                    uploader: entry.uploader.clone().or_else(|| info.uploader.clone()),
                    selected: true,
                })
                .collect();

            return Self {
                kind,
                title: info.title.clone(),
                uploader: info.uploader.clone(),
                items,
            };
        }

        let entry = entries.first().copied();
        let url = entry
            .and_then(MediaInfo::page_url)
            .or_else(|| info.page_url())
            .unwrap_or(requested_url)
            .to_string();
        let title = entry
            .and_then(|e| e.title.clone())
            .or_else(|| info.title.clone())
            .unwrap_or_else(|| "Unknown Title".to_string());
        let uploader = entry
            .and_then(|e| e.uploader.clone())
            .or_else(|| info.uploader.clone());

        Self {
            kind: ContentKind::Single,
            title: Some(title.clone()),
            uploader: uploader.clone(),
            items: vec![PreviewItem {
                url,
                title,
                duration: entry.and_then(|e| e.duration).or(info.duration),
                uploader,
                selected: true,
            }],
        }
    }
}

/// Resolves URLs into [`ContentDescriptor`]s through a [`MediaBackend`]
pub struct ContentAnalyzer {
    backend: Arc<dyn MediaBackend>,
    entry_limit: usize,
}

impl ContentAnalyzer {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self::with_limit(backend, DEFAULT_ENTRY_LIMIT)
    }

    pub fn with_limit(backend: Arc<dyn MediaBackend>, entry_limit: usize) -> Self {
        Self {
            backend,
            entry_limit: entry_limit.max(1),
        }
    }

    /// Analyze `url` without transferring media.
    ///
    /// Every failure comes back as [`VideoloaderError::InvalidUrl`] or
    /// [`VideoloaderError::AnalysisFailed`] with a one-line message.
    pub async fn analyze(&self, url: &str) -> Result<ContentDescriptor, VideoloaderError> {
        let url = url.trim();
        validate_url(url)?;

        debug!("Analyzing {} via {}", url, self.backend.id());
        match self.backend.extract_flat(url, self.entry_limit).await {
            Ok(info) => {
                let descriptor = ContentDescriptor::from_info(&info, url);
                info!("Analyzed {}: {}", url, descriptor.label());
                Ok(descriptor)
            }
            Err(e) => {
                warn!("Analysis of {} failed: {:#}", url, e);
                Err(VideoloaderError::AnalysisFailed(short_message(
                    &e.to_string(),
                    FAILURE_MESSAGE_LIMIT,
                )))
            }
        }
    }
}

/// Selection state over analyzed items, owned by the presentation layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewList {
    items: Vec<PreviewItem>,
}

impl PreviewList {
    pub fn new(descriptor: &ContentDescriptor) -> Self {
        Self {
            items: descriptor.items.clone(),
        }
    }

    pub fn items(&self) -> &[PreviewItem] {
        &self.items
    }

    pub fn select_all(&mut self) {
        self.items.iter_mut().for_each(|i| i.selected = true);
    }

    pub fn select_none(&mut self) {
        self.items.iter_mut().for_each(|i| i.selected = false);
    }

    /// Set one item's flag; out-of-range indices are ignored.
    pub fn set_selected(&mut self, index: usize, selected: bool) {
        if let Some(item) = self.items.get_mut(index) {
            item.selected = selected;
        }
    }

    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|i| i.selected).count()
    }

    pub fn summary(&self) -> String {
        format!("{} of {} items selected", self.selected_count(), self.items.len())
    }
}

/// `m:ss` for a duration in seconds.
pub fn format_duration(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let total = seconds as u64;
    Some(format!("{}:{:02}", total / 60, total % 60))
}
