//! Per-task download options and their resolution into a transfer configuration

use crate::downloader::format_selector::{Container, FormatSelector};
use crate::extractor::PreviewItem;
use crate::utils::config::Settings;
use crate::utils::error::VideoloaderError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output template for the flat layout, relative to the output directory.
pub const FLAT_TEMPLATE: &str = "%(title)s.%(ext)s";
/// Output template grouping files by playlist title, else uploader.
pub const FOLDER_TEMPLATE: &str = "%(playlist_title,uploader)s/%(title)s.%(ext)s";

/// What a task fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    #[default]
    Video,
    Audio,
    Metadata,
}

impl DownloadKind {
    /// Prefix put in front of the task title.
    pub fn tag(&self) -> &'static str {
        match self {
            DownloadKind::Video => "[Video]",
            DownloadKind::Audio => "[Audio]",
            DownloadKind::Metadata => "[Metadata]",
        }
    }
}

/// Options attached to one enqueued URL.
///
/// Precedence: `format_id` > kind-driven derivation > settings defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadOptions {
    pub kind: DownloadKind,
    pub format_id: Option<String>,
    pub quality: Option<String>,
    pub format_preference: Option<Container>,
    pub audio_only: bool,
    pub metadata_only: bool,
}

impl DownloadOptions {
    pub fn video(quality: impl Into<String>, container: Container) -> Self {
        Self {
            kind: DownloadKind::Video,
            quality: Some(quality.into()),
            format_preference: Some(container),
            ..Default::default()
        }
    }

    pub fn audio() -> Self {
        Self {
            kind: DownloadKind::Audio,
            audio_only: true,
            ..Default::default()
        }
    }

    pub fn metadata() -> Self {
        Self {
            kind: DownloadKind::Metadata,
            metadata_only: true,
            ..Default::default()
        }
    }

    pub fn with_format_id(format_id: impl Into<String>) -> Self {
        Self {
            format_id: Some(format_id.into()),
            ..Default::default()
        }
    }
}

/// Configuration handed to the extraction library for one transfer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferOptions {
    pub quiet: bool,
    pub no_warnings: bool,
    pub format: Option<String>,
    pub output_template: String,
    pub merge_output_format: Option<Container>,
    pub write_info_json: bool,
    pub write_subtitles: bool,
    pub write_auto_subtitles: bool,
    pub subtitle_langs: Vec<String>,
    pub write_thumbnail: bool,
    pub write_description: bool,
    pub skip_download: bool,
}

/// A transfer configuration plus the category tag chosen for the task title
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTransfer {
    pub options: TransferOptions,
    pub title_tag: Option<&'static str>,
    pub output_dir: PathBuf,
}

/// Output template for `output_dir`, honoring `organize_in_folders`.
pub fn output_template(output_dir: &Path, organize_in_folders: bool) -> String {
    let template = if organize_in_folders {
        FOLDER_TEMPLATE
    } else {
        FLAT_TEMPLATE
    };
    output_dir.join(template).to_string_lossy().into_owned()
}

/// Combine per-task options with the settings captured at enqueue time.
pub fn resolve(options: &DownloadOptions, settings: &Settings) -> ResolvedTransfer {
    let mut transfer = TransferOptions {
        quiet: true,
        no_warnings: true,
        output_template: output_template(&settings.output_dir, settings.organize_in_folders),
        write_info_json: settings.save_metadata,
        ..Default::default()
    };

    if let Some(format_id) = options.format_id.as_deref().filter(|f| !f.is_empty()) {
        transfer.format = Some(format_id.to_string());
        return ResolvedTransfer {
            options: transfer,
            title_tag: None,
            output_dir: settings.output_dir.clone(),
        };
    }

    let audio_only =
        options.kind == DownloadKind::Audio || options.audio_only || settings.audio_only;
    let metadata_only = options.kind == DownloadKind::Metadata || options.metadata_only;
    let container = options.format_preference.unwrap_or(settings.format_preference);
    let quality = options.quality.as_deref().unwrap_or(&settings.quality);

    let title_tag = if metadata_only {
        transfer.skip_download = true;
        transfer.write_info_json = true;
        transfer.write_subtitles = true;
        transfer.write_auto_subtitles = true;
        transfer.write_thumbnail = true;
        transfer.write_description = true;
        DownloadKind::Metadata.tag()
    } else if audio_only {
        DownloadKind::Audio.tag()
    } else {
        DownloadKind::Video.tag()
    };

    transfer.format = Some(FormatSelector::select(quality, container, audio_only));
    transfer.merge_output_format =
        FormatSelector::merge_output_format(quality, container, audio_only);

    if settings.include_subtitles {
        transfer.write_subtitles = true;
        transfer.subtitle_langs = vec!["en".to_string()];
    }

    ResolvedTransfer {
        options: transfer,
        title_tag: Some(title_tag),
        output_dir: settings.output_dir.clone(),
    }
}

/// Which kinds the user ticked for a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadKinds {
    pub video: bool,
    pub audio: bool,
    pub metadata: bool,
}

impl DownloadKinds {
    pub fn any(&self) -> bool {
        self.video || self.audio || self.metadata
    }
}

/// Expand selected preview items into one (url, options) pair per kind.
pub fn plan_downloads(
    items: &[PreviewItem],
    kinds: DownloadKinds,
    settings: &Settings,
) -> Result<Vec<(String, DownloadOptions)>, VideoloaderError> {
    let selected: Vec<&PreviewItem> = items.iter().filter(|i| i.selected).collect();
    if selected.is_empty() {
        return Err(VideoloaderError::NoSelection(
            "select at least one item".to_string(),
        ));
    }
    if !kinds.any() {
        return Err(VideoloaderError::NoSelection(
            "choose video, audio or metadata".to_string(),
        ));
    }

    let mut plan = Vec::new();
    for item in selected {
        if kinds.video {
            plan.push((
                item.url.clone(),
                DownloadOptions::video(settings.quality.clone(), settings.format_preference),
            ));
        }
        if kinds.audio {
            plan.push((item.url.clone(), DownloadOptions::audio()));
        }
        if kinds.metadata {
            plan.push((item.url.clone(), DownloadOptions::metadata()));
        }
    }

    Ok(plan)
}
