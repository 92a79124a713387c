use crate::downloader::{DownloadKinds, DownloadOptions};
use crate::extractor::{ContentDescriptor, PreviewItem};
use crate::queue::{DownloadTask, QueueEvent, QueueStats};
use crate::utils::config::Settings;
use crate::utils::thumbnail::Thumbnail;

/// Commands sent from the presentation layer to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    Analyze {
        url: String,
    },
    Enqueue {
        url: String,
        options: DownloadOptions,
    },
    /// Plan and enqueue one task per selected item and ticked kind
    EnqueueSelected {
        items: Vec<PreviewItem>,
        kinds: DownloadKinds,
    },
    Cancel(String),
    Remove(String),
    ClearFinished,
    SaveSettings(Settings),
    FetchThumbnail {
        url: String,
    },
    // System
    Shutdown,
}

/// Events sent from the backend to the presentation layer
#[derive(Debug, Clone)]
pub enum BackendEvent {
    // Analysis
    AnalysisStarted {
        url: String,
    },
    AnalysisCompleted {
        url: String,
        result: Result<ContentDescriptor, String>,
    },
    ThumbnailReady {
        url: String,
        thumbnail: Option<Thumbnail>,
    },

    // Queue
    TaskQueued {
        task_id: String,
        url: String,
    },
    EnqueueFailed {
        url: String,
        error: String,
    },
    /// Lifecycle change forwarded from the queue
    Queue(QueueEvent),
    /// Periodic view of every task
    Snapshot {
        tasks: Vec<DownloadTask>,
        stats: QueueStats,
    },
    Cleared(usize),

    // Settings
    SettingsSaved(Result<(), String>),

    // System
    Error(String),
    Stopped,
}
