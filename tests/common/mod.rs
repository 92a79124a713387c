//! Scripted in-memory media backend shared by the integration tests
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use videoloader::downloader::{HookAction, ProgressEvent, ProgressHook, TransferOptions};
use videoloader::extractor::{MediaBackend, MediaInfo};
use videoloader::queue::{DownloadTask, QueueManager};
use videoloader::utils::{Settings, VideoloaderError};

/// One thing the fake transfer does
#[derive(Debug, Clone)]
pub enum Step {
    Progress(ProgressEvent),
    Sleep(Duration),
    Fail(String),
}

/// Behaviour of the fake library for one URL
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub title: Option<String>,
    pub info_error: Option<String>,
    pub steps: Vec<Step>,
}

impl Script {
    /// downloading 10%, downloading 55%, finished
    pub fn standard() -> Self {
        Self {
            title: Some("Sample Clip".to_string()),
            info_error: None,
            steps: vec![
                Step::Progress(ProgressEvent::downloading(" 10.0%")),
                Step::Progress(ProgressEvent::downloading(" 55.0%")),
                Step::Progress(ProgressEvent::finished(Some("/downloads/Sample Clip.mp4"))),
            ],
        }
    }

    /// `ticks` progress reports spaced by `pause`, then finished
    pub fn slow(ticks: usize, pause: Duration) -> Self {
        let mut steps = Vec::new();
        for i in 0..ticks {
            let percent = (i + 1) as f64 * 100.0 / (ticks + 1) as f64;
            steps.push(Step::Progress(ProgressEvent::downloading(&format!("{:.1}%", percent))));
            steps.push(Step::Sleep(pause));
        }
        steps.push(Step::Progress(ProgressEvent::finished(Some("/downloads/slow.mp4"))));
        Self {
            title: Some("Slow Clip".to_string()),
            info_error: None,
            steps,
        }
    }

    /// Report `percent` then fail with `message`
    pub fn failing_after(percent: &str, message: &str) -> Self {
        Self {
            title: Some("Broken Clip".to_string()),
            info_error: None,
            steps: vec![
                Step::Progress(ProgressEvent::downloading(percent)),
                Step::Fail(message.to_string()),
            ],
        }
    }

    /// Progress only, the library never says "finished"
    pub fn silent_finish() -> Self {
        Self {
            title: Some("Merged Clip".to_string()),
            info_error: None,
            steps: vec![Step::Progress(ProgressEvent::downloading("42%"))],
        }
    }

    /// Separate video and audio streams, each reporting "finished", with the
    /// second one arriving `pause` after the first
    pub fn two_streams(pause: Duration) -> Self {
        Self {
            title: Some("Merged Clip".to_string()),
            info_error: None,
            steps: vec![
                Step::Progress(ProgressEvent::downloading("50%")),
                Step::Progress(ProgressEvent::finished(Some("/downloads/Merged Clip.f137.mp4"))),
                Step::Sleep(pause),
                Step::Progress(ProgressEvent::finished(Some("/downloads/Merged Clip.f140.m4a"))),
            ],
        }
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            info_error: Some(message.to_string()),
            ..Default::default()
        }
    }
}

pub struct MockBackend {
    default_script: Script,
    scripts: HashMap<String, Script>,
    flat: HashMap<String, MediaInfo>,
    started: Mutex<Vec<String>>,
    transfers: Mutex<Vec<(String, TransferOptions)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    returned: AtomicUsize,
    succeeded: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_default(Script::standard())
    }

    pub fn with_default(script: Script) -> Self {
        Self {
            default_script: script,
            scripts: HashMap::new(),
            flat: HashMap::new(),
            started: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
        }
    }

    pub fn script(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn flat(mut self, url: &str, info: MediaInfo) -> Self {
        self.flat.insert(url.to_string(), info);
        self
    }

    /// URLs in the order their transfers began
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn transfers(&self) -> Vec<(String, TransferOptions)> {
        self.transfers.lock().unwrap().clone()
    }

    /// Highest number of transfers seen running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Transfers that have returned, successfully or not
    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::SeqCst)
    }

    /// Transfers that ran to the end of their script
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    fn script_for(&self, url: &str) -> &Script {
        self.scripts.get(url).unwrap_or(&self.default_script)
    }

    async fn play(&self, script: &Script, hook: &ProgressHook) -> Result<()> {
        for step in &script.steps {
            match step {
                Step::Progress(event) => {
                    if hook(event) == HookAction::Abort {
                        return Err(VideoloaderError::Cancelled.into());
                    }
                }
                Step::Sleep(pause) => tokio::time::sleep(*pause).await,
                Step::Fail(message) => {
                    return Err(VideoloaderError::DownloadError(message.clone()).into())
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MediaBackend for MockBackend {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn extract_info(&self, url: &str) -> Result<MediaInfo> {
        let script = self.script_for(url);
        if let Some(message) = &script.info_error {
            return Err(VideoloaderError::ExtractionError(message.clone()).into());
        }
        Ok(MediaInfo {
            title: script.title.clone(),
            webpage_url: Some(url.to_string()),
            ..Default::default()
        })
    }

    async fn extract_flat(&self, url: &str, limit: usize) -> Result<MediaInfo> {
        let mut info = self
            .flat
            .get(url)
            .cloned()
            .ok_or_else(|| {
                VideoloaderError::ExtractionError(format!("ERROR: Unsupported URL: {}", url))
            })?;
        if let Some(entries) = info.entries.as_mut() {
            entries.truncate(limit);
        }
        Ok(info)
    }

    async fn download(
        &self,
        url: &str,
        options: &TransferOptions,
        hook: &ProgressHook,
    ) -> Result<()> {
        self.started.lock().unwrap().push(url.to_string());
        self.transfers
            .lock()
            .unwrap()
            .push((url.to_string(), options.clone()));

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let script = self.script_for(url).clone();
        let result = self.play(&script, hook).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        if result.is_ok() {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }
        self.returned.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Settings pointing at a scratch output directory
pub fn test_settings(output_dir: &std::path::Path, concurrent: usize) -> Settings {
    Settings {
        output_dir: output_dir.to_path_buf(),
        concurrent_downloads: concurrent,
        ..Settings::default()
    }
}

/// Poll until the task is terminal, failing the test after a few seconds
pub async fn wait_for_terminal(qm: &QueueManager, task_id: &str) -> DownloadTask {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = qm.get_task(task_id).await.expect("task should be registered");
        if task.status.is_terminal() {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {} stuck in {}",
            task_id,
            task.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until `check` holds for the task
pub async fn wait_until<F>(qm: &QueueManager, task_id: &str, check: F) -> DownloadTask
where
    F: Fn(&DownloadTask) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = qm.get_task(task_id).await.expect("task should be registered");
        if check(&task) {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition never held for task {} ({})",
            task_id,
            task.status
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
