//! Per-user path resolution
//!
//! Paths are always resolved from the user's home directory, never relative to
//! the current working directory, so the tool behaves the same whether it is
//! started from a shell, a launcher or a desktop shortcut.

use std::path::PathBuf;
use tracing::warn;

/// File name of the persisted settings, directly under `$HOME`.
pub const SETTINGS_FILE_NAME: &str = ".videodownloader_settings.json";

/// Folder created under the platform Downloads directory.
pub const OUTPUT_FOLDER_NAME: &str = "VideoDownloader";

/// Environment variable that pins the yt-dlp executable.
pub const YTDLP_ENV: &str = "VIDEOLOADER_YTDLP";

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using temp dir");
        std::env::temp_dir()
    })
}

/// Returns: `$HOME/.videodownloader_settings.json`
pub fn settings_file() -> PathBuf {
    home_dir().join(SETTINGS_FILE_NAME)
}

/// Returns: `$HOME/Downloads/VideoDownloader`
///
/// The Downloads folder is taken from the platform lookup first and falls back
/// to `$HOME/Downloads` when that fails.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(|| home_dir().join("Downloads"))
        .join(OUTPUT_FOLDER_NAME)
}
