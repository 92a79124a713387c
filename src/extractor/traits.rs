use crate::downloader::options::TransferOptions;
use crate::downloader::progress::ProgressHook;
use crate::extractor::models::MediaInfo;
use anyhow::Result;
use async_trait::async_trait;

/// The extraction/download library as seen by the rest of the application.
///
/// Implementations resolve metadata and perform transfers; everything about
/// site support, stream negotiation and muxing stays behind this trait.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Returns a unique identifier for this backend (e.g., "yt-dlp")
    fn id(&self) -> &'static str;

    /// Full metadata for `url` without transferring media
    async fn extract_info(&self, url: &str) -> Result<MediaInfo>;

    /// Lightweight descriptors for a collection, at most `limit` entries
    async fn extract_flat(&self, url: &str, limit: usize) -> Result<MediaInfo>;

    /// Perform the transfer, calling `hook` for every progress report.
    ///
    /// When the hook answers [`HookAction::Abort`](crate::downloader::HookAction)
    /// the implementation stops the transfer and fails with
    /// [`VideoloaderError::Cancelled`](crate::utils::VideoloaderError).
    async fn download(
        &self,
        url: &str,
        options: &TransferOptions,
        hook: &ProgressHook,
    ) -> Result<()>;
}
