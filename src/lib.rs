//! Videoloader library
//!
//! Queue-based front end for yt-dlp: content analysis, format selection and
//! a bounded pool of download workers.

pub mod backend;
pub mod downloader;
pub mod extractor;
pub mod queue;
pub mod utils;

// Re-export main types for easier use
pub use backend::{BackendActor, BackendCommand, BackendEvent};
pub use downloader::{Container, DownloadOptions, FormatSelector};
pub use extractor::{ContentAnalyzer, ContentDescriptor, MediaBackend, MediaInfo, YtDlpBackend};
pub use queue::{DownloadTask, QueueManager, TaskStatus};
pub use utils::{Settings, VideoloaderError};
