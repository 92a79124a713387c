//! yt-dlp backend
//!
//! Drives the `yt-dlp` executable as a child process. Metadata comes from
//! `-J`; transfers report progress through a `--progress-template` that prints
//! one tab-separated line per progress callback, which is parsed back into a
//! [`ProgressEvent`] and handed to the caller's hook.

use crate::downloader::options::TransferOptions;
use crate::downloader::progress::{HookAction, ProgressEvent, ProgressHook, ProgressStatus};
use crate::extractor::models::MediaInfo;
use crate::extractor::traits::MediaBackend;
use crate::utils::error::{short_message, VideoloaderError};
use crate::utils::paths::YTDLP_ENV;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info, warn};

/// Marker that starts every machine-readable progress line.
pub const PROGRESS_PREFIX: &str = "[videoloader]";

const ERROR_MESSAGE_LIMIT: usize = 160;

/// `--progress-template` value: status, percent, speed, eta, total bytes, filename.
pub fn progress_template() -> String {
    format!(
        "download:{} %(progress.status)s\t%(progress._percent_str)s\t%(progress._speed_str)s\t%(progress._eta_str)s\t%(progress.total_bytes)s\t%(progress.filename)s",
        PROGRESS_PREFIX
    )
}

/// Parse one line printed through [`progress_template`].
///
/// Returns `None` for lines that are not progress reports. Individual fields
/// that are missing (`NA`) or unparsable come back as `None`.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim_start().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.trim_start_matches(' ').split('\t');

    let status = ProgressStatus::parse(fields.next()?);
    let text = |raw: Option<&str>| -> Option<String> {
        raw.map(str::trim)
            .filter(|v| !v.is_empty() && *v != "NA" && *v != "None")
            .map(str::to_string)
    };

    let percent_str = text(fields.next());
    let speed_str = text(fields.next());
    let eta_str = text(fields.next());
    let total_bytes = text(fields.next()).and_then(|v| {
        v.parse::<u64>()
            .ok()
            .or_else(|| v.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
    });
    let filename = text(fields.next());

    Some(ProgressEvent {
        status,
        percent_str,
        speed_str,
        eta_str,
        total_bytes,
        filename,
    })
}

/// Command-line arguments for a transfer of `url` with `options`.
pub fn download_args(url: &str, options: &TransferOptions) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if options.quiet {
        args.push("--quiet".into());
    }
    if options.no_warnings {
        args.push("--no-warnings".into());
    }

    // Progress must stay on even in quiet mode; it feeds the hook
    args.push("--newline".into());
    args.push("--progress".into());
    args.push("--progress-template".into());
    args.push(progress_template());

    if let Some(format) = &options.format {
        args.push("-f".into());
        args.push(format.clone());
    }

    args.push("-o".into());
    args.push(options.output_template.clone());

    if let Some(container) = options.merge_output_format {
        args.push("--merge-output-format".into());
        args.push(container.as_str().into());
    }
    if options.write_info_json {
        args.push("--write-info-json".into());
    }
    if options.write_subtitles {
        args.push("--write-subs".into());
    }
    if options.write_auto_subtitles {
        args.push("--write-auto-subs".into());
    }
    if !options.subtitle_langs.is_empty() {
        args.push("--sub-langs".into());
        args.push(options.subtitle_langs.join(","));
    }
    if options.write_thumbnail {
        args.push("--write-thumbnail".into());
    }
    if options.write_description {
        args.push("--write-description".into());
    }
    if options.skip_download {
        args.push("--skip-download".into());
    }

    args.push("--".into());
    args.push(url.to_string());
    args
}

/// Backend that shells out to yt-dlp
pub struct YtDlpBackend {
    ytdlp_path: PathBuf,
}

impl YtDlpBackend {
    /// Locate yt-dlp and build the backend.
    pub fn new() -> Result<Self> {
        match find_ytdlp() {
            Some(path) => {
                info!("Found yt-dlp at: {}", path.display());
                Ok(Self { ytdlp_path: path })
            }
            None => {
                error!("yt-dlp not found anywhere!");
                Err(VideoloaderError::YtDlpNotFound.into())
            }
        }
    }

    /// Use a specific executable.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp_path: path.into(),
        }
    }

    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp_path
    }

    async fn run_json(&self, args: &[&str], url: &str) -> Result<MediaInfo> {
        debug!("Running yt-dlp {:?} for {}", args, url);

        let output = AsyncCommand::new(&self.ytdlp_path)
            .args(args)
            .arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp extraction failed: {}", stderr.trim());
            let message = short_message(&stderr, ERROR_MESSAGE_LIMIT);
            return Err(VideoloaderError::ExtractionError(message).into());
        }

        let info: MediaInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info)
    }
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract_info(&self, url: &str) -> Result<MediaInfo> {
        self.run_json(&["-J", "--no-warnings"], url).await
    }

    async fn extract_flat(&self, url: &str, limit: usize) -> Result<MediaInfo> {
        let limit = limit.max(1).to_string();
        self.run_json(
            &["-J", "--no-warnings", "--flat-playlist", "--playlist-end", &limit],
            url,
        )
        .await
    }

    async fn download(
        &self,
        url: &str,
        options: &TransferOptions,
        hook: &ProgressHook,
    ) -> Result<()> {
        let args = download_args(url, options);
        debug!("Spawning yt-dlp with {:?}", args);

        let mut child = AsyncCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("yt-dlp stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("yt-dlp stderr was not captured"))?;

        // Progress may land on either stream depending on --quiet; read both
        // from this one loop so the hook sees a single ordered sequence.
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_open = true;
        let mut err_open = true;
        let mut last_error: Option<String> = None;

        while out_open || err_open {
            let line = tokio::select! {
                next = out_lines.next_line(), if out_open => match next {
                    Ok(Some(line)) => line,
                    _ => {
                        out_open = false;
                        continue;
                    }
                },
                next = err_lines.next_line(), if err_open => match next {
                    Ok(Some(line)) => line,
                    _ => {
                        err_open = false;
                        continue;
                    }
                },
            };

            if let Some(event) = parse_progress_line(&line) {
                if hook(&event) == HookAction::Abort {
                    info!("Aborting yt-dlp transfer of {}", url);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill yt-dlp: {}", e);
                    }
                    return Err(VideoloaderError::Cancelled.into());
                }
            } else if line.trim_start().starts_with("ERROR:") {
                warn!("yt-dlp: {}", line.trim());
                last_error = Some(line);
            } else if !line.trim().is_empty() {
                debug!("yt-dlp: {}", line.trim());
            }
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            let message = match last_error {
                Some(line) => short_message(&line, ERROR_MESSAGE_LIMIT),
                None => format!("yt-dlp exited with {}", status),
            };
            Err(VideoloaderError::DownloadError(message).into())
        }
    }
}

// ============================================================
// yt-dlp Detection Functions
// ============================================================

/// Find yt-dlp with priority:
/// 1. `VIDEOLOADER_YTDLP` override
/// 2. Next to the current executable
/// 3. System PATH
/// 4. Common installation paths
pub fn find_ytdlp() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(YTDLP_ENV).map(PathBuf::from) {
        if is_executable(&path) {
            info!("✓ Using yt-dlp from {}: {:?}", YTDLP_ENV, path);
            return Some(path);
        }
        warn!("{} points at {:?}, which is not executable", YTDLP_ENV, path);
    }

    if let Some(bundled) = find_beside_executable() {
        info!("✓ Using bundled yt-dlp: {:?}", bundled);
        return Some(bundled);
    }

    if let Ok(system) = which::which("yt-dlp") {
        info!("✓ Using system yt-dlp: {:?}", system);
        return Some(system);
    }

    if let Some(common) = find_in_common_paths() {
        info!("✓ Using yt-dlp from common path: {:?}", common);
        return Some(common);
    }

    warn!("✗ yt-dlp not found anywhere!");
    None
}

fn find_beside_executable() -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    let name = if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" };
    let candidate = exe_dir.join(name);
    is_executable(&candidate).then_some(candidate)
}

fn find_in_common_paths() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/opt/homebrew/bin/yt-dlp"),
        PathBuf::from("/usr/local/bin/yt-dlp"),
        PathBuf::from("/usr/bin/yt-dlp"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/bin/yt-dlp"));
    }

    candidates.into_iter().find(|p| is_executable(p))
}

/// Check if a file is executable
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        match std::fs::metadata(path) {
            Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
