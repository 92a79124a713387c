//! Download task record and its state machine

use crate::downloader::options::DownloadOptions;
use crate::downloader::progress::{format_megabytes, strip_ansi, ProgressEvent, ProgressStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Placeholder title until metadata resolves.
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Downloading)
                | (Pending, Cancelled)
                | (Downloading, Completed)
                | (Downloading, Failed)
                | (Downloading, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Download task
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    pub id: String,
    pub url: String,
    pub title: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub speed: String,
    pub eta: String,
    pub file_size: String,
    pub filename: String,
    pub filepath: String,
    pub error: Option<String>,
    pub options: DownloadOptions,
    pub added_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl DownloadTask {
    /// Create a new pending task
    pub fn new(url: impl Into<String>, options: DownloadOptions) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            title: UNKNOWN_TITLE.to_string(),
            status: TaskStatus::Pending,
            progress: 0.0,
            speed: String::new(),
            eta: String::new(),
            file_size: String::new(),
            filename: String::new(),
            filepath: String::new(),
            error: None,
            options,
            added_at: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// Returns false, leaving the task untouched, for any other move.
    fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        self.status = next;
        if next == TaskStatus::Downloading {
            self.start_time = Some(now);
        }
        if next.is_terminal() {
            self.end_time = Some(now);
        }
        true
    }

    pub fn mark_downloading(&mut self) -> bool {
        self.transition(TaskStatus::Downloading)
    }

    /// Completion always reports 100%.
    pub fn complete(&mut self) -> bool {
        if self.transition(TaskStatus::Completed) {
            self.progress = 100.0;
            true
        } else {
            false
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.transition(TaskStatus::Failed) {
            let message = message.into();
            self.error = Some(if message.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                message
            });
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) -> bool {
        self.transition(TaskStatus::Cancelled)
    }

    /// Set the display title, keeping the category tag in front if any.
    pub fn set_title(&mut self, tag: Option<&str>, title: &str) {
        self.title = match tag {
            Some(tag) => format!("{} {}", tag, title),
            None => title.to_string(),
        };
    }

    /// Fold one progress callback into the task.
    ///
    /// Only applies while downloading. Missing or unparsable fields keep their
    /// previous value and the percentage never goes backwards. Returns true
    /// when the event completed the task.
    pub fn apply_progress(&mut self, event: &ProgressEvent) -> bool {
        if self.status != TaskStatus::Downloading {
            return false;
        }

        match event.status {
            ProgressStatus::Downloading => {
                if let Some(percent) = event.percent() {
                    self.progress = self.progress.max(percent);
                }
                if let Some(speed) = display_field(event.speed_str.as_deref()) {
                    self.speed = speed;
                }
                if let Some(eta) = display_field(event.eta_str.as_deref()) {
                    self.eta = eta;
                }
                if let Some(total) = event.total_bytes.filter(|b| *b > 0) {
                    self.file_size = format_megabytes(total);
                }
                if let Some(path) = event.filename.as_deref() {
                    self.filename = base_name(path);
                }
                false
            }
            ProgressStatus::Finished => {
                if let Some(path) = event.filename.as_deref() {
                    self.filename = base_name(path);
                    self.filepath = path.to_string();
                }
                self.complete()
            }
            ProgressStatus::Other(_) => false,
        }
    }

    /// One-line description of where the task stands.
    pub fn status_line(&self) -> String {
        match self.status {
            TaskStatus::Pending => "Preparing...".to_string(),
            TaskStatus::Downloading => {
                let mut line = format!("{:.1}%", self.progress);
                if !self.speed.is_empty() {
                    line.push_str(&format!(" • {}", self.speed));
                }
                if !self.eta.is_empty() {
                    line.push_str(&format!(" • ETA: {}", self.eta));
                }
                if !self.file_size.is_empty() {
                    line.push_str(&format!(" • {}", self.file_size));
                }
                line
            }
            TaskStatus::Completed => format!("Completed • {}", self.filename),
            TaskStatus::Failed => format!(
                "Failed: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            ),
            TaskStatus::Cancelled => "Cancelled".to_string(),
        }
    }
}

fn display_field(raw: Option<&str>) -> Option<String> {
    let cleaned = strip_ansi(raw?);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
