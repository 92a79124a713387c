//! Error handling for Videoloader

use thiserror::Error;

/// Main error type for Videoloader
#[derive(Debug, Error)]
pub enum VideoloaderError {
    #[error("yt-dlp not found. Please install yt-dlp")]
    YtDlpNotFound,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Failed to extract video info: {0}")]
    ExtractionError(String),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Nothing selected: {0}")]
    NoSelection(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl VideoloaderError {
    /// Whether an `anyhow` error chain bottoms out in a cancellation.
    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<VideoloaderError>(),
            Some(VideoloaderError::Cancelled)
        )
    }
}

/// Reduce a library error to a single short line suitable for a status label.
///
/// yt-dlp prefixes its messages with `ERROR: ` and often appends multi-line
/// hints; only the first line is kept and it is capped at `max_chars`.
pub fn short_message(message: &str, max_chars: usize) -> String {
    let first = message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown error");
    let first = first.strip_prefix("ERROR:").map(str::trim).unwrap_or(first);

    if first.chars().count() <= max_chars {
        first.to_string()
    } else {
        let mut cut: String = first.chars().take(max_chars.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }
}
