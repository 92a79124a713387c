//! Videoloader - queue-based video downloader
//!
//! Headless front end over yt-dlp: single downloads, metadata dumps, content
//! analysis and batch runs through the bounded download queue.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use path_absolutize::Absolutize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Level;
use videoloader::backend::{BackendActor, BackendCommand, BackendEvent};
use videoloader::downloader::{plan_downloads, Container, DownloadKinds, DownloadOptions};
use videoloader::extractor::analyzer::{format_duration, DEFAULT_ENTRY_LIMIT};
use videoloader::extractor::{ContentAnalyzer, InfoSummary, MediaBackend, YtDlpBackend};
use videoloader::queue::task::UNKNOWN_TITLE;
use videoloader::queue::{QueueManager, TaskStatus};
use videoloader::utils::{self, validate_url, Settings, VideoloaderError};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(
    name = "videoloader",
    version,
    about = "Download videos, audio and metadata with yt-dlp"
)]
struct Cli {
    /// Settings file (default: ~/.videodownloader_settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a single URL
    Download {
        url: String,

        /// best, worst or a height such as 720p
        #[arg(long, value_parser = parse_quality)]
        quality: Option<String>,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Extract audio only
        #[arg(long)]
        audio_only: bool,

        /// mp4, webm, mkv or any
        #[arg(long)]
        format: Option<Container>,
    },
    /// Print metadata as JSON
    Info { url: String },
    /// Show what a URL contains without downloading
    Analyze {
        url: String,

        /// Maximum number of entries to resolve
        #[arg(long, default_value_t = DEFAULT_ENTRY_LIMIT)]
        limit: usize,
    },
    /// Download every entry of a playlist or channel
    Batch {
        url: String,

        #[arg(long)]
        video: bool,

        #[arg(long)]
        audio: bool,

        #[arg(long)]
        metadata: bool,

        /// Maximum number of entries to resolve
        #[arg(long, default_value_t = DEFAULT_ENTRY_LIMIT)]
        limit: usize,
    },
}

/// Accept `best`, `worst` or a height like `720p`
fn parse_quality(raw: &str) -> Result<String, String> {
    let value = raw.trim().to_ascii_lowercase();
    let is_height = value
        .strip_suffix('p')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));

    if value == "best" || value == "worst" || is_height {
        Ok(value)
    } else {
        Err(format!(
            "expected best, worst or a height such as 720p, got '{}'",
            raw
        ))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings_path = cli.settings.unwrap_or_else(utils::settings_file);
    let settings = Settings::load_from(&settings_path);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Download {
                url,
                quality,
                output,
                audio_only,
                format,
            } => cmd_download(settings, &url, output, quality, format, audio_only).await,
            Command::Info { url } => cmd_info(&url).await,
            Command::Analyze { url, limit } => cmd_analyze(&url, limit).await,
            Command::Batch {
                url,
                video,
                audio,
                metadata,
                limit,
            } => {
                let kinds = DownloadKinds {
                    video,
                    audio,
                    metadata,
                };
                cmd_batch(settings, settings_path, &url, kinds, limit).await
            }
        }
    })
}

fn ytdlp_backend() -> Result<Arc<dyn MediaBackend>> {
    Ok(Arc::new(YtDlpBackend::new()?))
}

async fn cmd_info(url: &str) -> Result<ExitCode> {
    validate_url(url)?;
    let backend = ytdlp_backend()?;
    let info = backend.extract_info(url).await?;

    let summary = InfoSummary::from_info(&info, url);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_download(
    mut settings: Settings,
    url: &str,
    output: Option<PathBuf>,
    quality: Option<String>,
    format: Option<Container>,
    audio_only: bool,
) -> Result<ExitCode> {
    validate_url(url)?;
    if let Some(output) = output {
        settings.output_dir = output
            .absolutize()
            .context("Invalid output directory")?
            .into_owned();
    }

    let quality = quality.unwrap_or_else(|| settings.quality.clone());
    let container = format.unwrap_or(settings.format_preference);
    let audio_only = audio_only || settings.audio_only;

    let options = if audio_only {
        DownloadOptions {
            format_preference: Some(container),
            ..DownloadOptions::audio()
        }
    } else {
        DownloadOptions::video(quality.clone(), container)
    };

    println!("Downloading: {}", url);
    println!(
        "  Quality: {} | Format: {} | Audio-only: {}",
        quality, container, audio_only
    );
    println!("  Output: {}", settings.output_dir.display());

    let queue = QueueManager::new(settings, ytdlp_backend()?);
    let task_id = queue.enqueue(url, options).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut title_shown = false;
    let outcome = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("\nCancelling...");
                queue.cancel_task(&task_id).await?;
            }
        }

        let task = queue
            .get_task(&task_id)
            .await
            .ok_or_else(|| VideoloaderError::TaskNotFound(task_id.clone()))?;

        if !title_shown
            && !task.title.ends_with(UNKNOWN_TITLE)
            && task.status != TaskStatus::Pending
        {
            println!("  Title: {}", task.title);
            title_shown = true;
        }

        match task.status {
            TaskStatus::Downloading => {
                print!("\r  {:.1}%  {}  ETA: {}  ", task.progress, task.speed, task.eta);
                let _ = std::io::stdout().flush();
            }
            status if status.is_terminal() => break task,
            _ => {}
        }
    };

    // Later streams and the merge can still be running after the first "finished"
    let mut merge_interrupted = false;
    if !interrupted {
        tokio::select! {
            _ = queue.wait_idle() => {}
            _ = &mut ctrl_c => {
                eprintln!("\nCancelling...");
                merge_interrupted = true;
            }
        }
    }
    queue.shutdown(Duration::ZERO).await;

    if merge_interrupted {
        return Err(VideoloaderError::Cancelled.into());
    }

    match outcome.status {
        TaskStatus::Completed => {
            if !outcome.filename.is_empty() {
                println!("\n  Finished: {}", outcome.filename);
            }
            println!("Done.");
            Ok(ExitCode::SUCCESS)
        }
        TaskStatus::Cancelled => Err(VideoloaderError::Cancelled.into()),
        _ => Err(VideoloaderError::DownloadError(
            outcome.error.unwrap_or_else(|| "unknown error".to_string()),
        )
        .into()),
    }
}

async fn cmd_analyze(url: &str, limit: usize) -> Result<ExitCode> {
    let analyzer = ContentAnalyzer::with_limit(ytdlp_backend()?, limit);
    let descriptor = analyzer.analyze(url).await?;

    println!("{}", descriptor.label());
    if let Some(title) = &descriptor.title {
        println!("Title: {}", title);
    }
    if let Some(uploader) = &descriptor.uploader {
        println!("Uploader: {}", uploader);
    }
    for (i, item) in descriptor.items.iter().enumerate() {
        let duration = item
            .duration
            .and_then(format_duration)
            .unwrap_or_else(|| "-".to_string());
        let uploader = item.uploader.as_deref().unwrap_or("-");
        println!("{:>3}. {}  [{}]  {}", i + 1, item.title, duration, uploader);
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_batch(
    settings: Settings,
    settings_path: PathBuf,
    url: &str,
    kinds: DownloadKinds,
    limit: usize,
) -> Result<ExitCode> {
    let backend = ytdlp_backend()?;
    let analyzer = ContentAnalyzer::with_limit(Arc::clone(&backend), limit);
    let descriptor = analyzer.analyze(url).await?;
    println!("{}", descriptor.label());

    // Validate the selection before starting any workers
    let expected = plan_downloads(&descriptor.items, kinds, &settings)?.len();

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let actor = BackendActor::new(settings, settings_path, backend, cmd_rx, event_tx);
    let actor_handle = tokio::spawn(actor.run());

    cmd_tx
        .send(BackendCommand::EnqueueSelected {
            items: descriptor.items.clone(),
            kinds,
        })
        .await
        .context("Backend stopped unexpectedly")?;

    let mut submitted = 0usize;
    let mut rejected = 0usize;
    let mut shutting_down = false;
    let mut last_status: HashMap<String, TaskStatus> = HashMap::new();
    let mut last_stats = String::new();
    let mut failed = 0usize;

    while let Some(event) = event_rx.recv().await {
        match event {
            BackendEvent::TaskQueued { .. } => submitted += 1,
            BackendEvent::EnqueueFailed { url, error } => {
                rejected += 1;
                eprintln!("Skipped {}: {}", url, error);
            }
            BackendEvent::Error(message) => {
                eprintln!("Error: {}", message);
                if !shutting_down {
                    shutting_down = true;
                    let _ = cmd_tx.send(BackendCommand::Shutdown).await;
                }
            }
            BackendEvent::Snapshot { tasks, stats } => {
                for task in &tasks {
                    let previous = last_status.insert(task.id.clone(), task.status);
                    if previous != Some(task.status) && task.status.is_terminal() {
                        println!("{:<10} {}", task.status.as_str(), task.title);
                        if let Some(error) = &task.error {
                            println!("           {}", error);
                        }
                    }
                }

                let line = stats.to_string();
                if line != last_stats {
                    println!("{}", line);
                    last_stats = line;
                }
                failed = stats.failed;

                let all_submitted = submitted + rejected >= expected;
                // is_idle also waits for transfers still merging after "finished"
                if !shutting_down
                    && all_submitted
                    && stats.total() >= submitted
                    && stats.is_idle()
                {
                    shutting_down = true;
                    let _ = cmd_tx.send(BackendCommand::Shutdown).await;
                }
            }
            BackendEvent::Stopped => break,
            _ => {}
        }
    }

    actor_handle.await.context("Backend task panicked")?;

    if failed > 0 || rejected > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
