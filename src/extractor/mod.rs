pub mod analyzer;
pub mod models;
pub mod traits;
pub mod ytdlp;

pub use analyzer::{ContentAnalyzer, ContentDescriptor, ContentKind, PreviewItem, PreviewList};
pub use models::{InfoSummary, MediaInfo};
pub use traits::MediaBackend;
pub use ytdlp::YtDlpBackend;
