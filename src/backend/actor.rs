use super::messages::{BackendCommand, BackendEvent};
use crate::downloader::{plan_downloads, DownloadKinds, DownloadOptions};
use crate::extractor::{ContentAnalyzer, MediaBackend, PreviewItem, YtDlpBackend};
use crate::queue::QueueManager;
use crate::utils::config::Settings;
use crate::utils::thumbnail::fetch_thumbnail;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How often the monitor pushes a full snapshot
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(500);

/// Time running downloads get to finish on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,

    // Components
    analyzer: Arc<ContentAnalyzer>,
    queue_manager: Arc<QueueManager>,
    http: reqwest::Client,

    settings: Settings,
    settings_path: PathBuf,
}

impl BackendActor {
    pub fn new(
        settings: Settings,
        settings_path: PathBuf,
        backend: Arc<dyn MediaBackend>,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        let settings = settings.normalized();
        let analyzer = Arc::new(ContentAnalyzer::new(Arc::clone(&backend)));
        let queue_manager = Arc::new(QueueManager::new(settings.clone(), backend));

        Self {
            receiver,
            sender,
            analyzer,
            queue_manager,
            http: reqwest::Client::new(),
            settings,
            settings_path,
        }
    }

    /// Build an actor over the yt-dlp executable found on this machine
    pub fn with_ytdlp(
        settings: Settings,
        settings_path: PathBuf,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Result<Self> {
        let backend: Arc<dyn MediaBackend> = Arc::new(YtDlpBackend::new()?);
        Ok(Self::new(settings, settings_path, backend, receiver, sender))
    }

    pub fn queue_manager(&self) -> Arc<QueueManager> {
        Arc::clone(&self.queue_manager)
    }

    pub async fn run(mut self) {
        info!("BackendActor started");

        let stop = CancellationToken::new();

        // Snapshot monitor
        let qm_monitor = Arc::clone(&self.queue_manager);
        let sender_monitor = self.sender.clone();
        let stop_monitor = stop.clone();
        let monitor = tokio::spawn(async move {
            Self::monitor_loop(qm_monitor, sender_monitor, stop_monitor).await;
        });

        // Lifecycle events
        let events = self.queue_manager.subscribe();
        let sender_events = self.sender.clone();
        let stop_events = stop.clone();
        let forwarder = tokio::spawn(async move {
            Self::forward_events(events, sender_events, stop_events).await;
        });

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                BackendCommand::Analyze { url } => self.handle_analyze(url),
                BackendCommand::Enqueue { url, options } => {
                    self.handle_enqueue(url, options).await;
                }
                BackendCommand::EnqueueSelected { items, kinds } => {
                    self.handle_enqueue_selected(items, kinds).await;
                }
                BackendCommand::Cancel(id) => {
                    if let Err(e) = self.queue_manager.cancel_task(&id).await {
                        self.send(BackendEvent::Error(e.to_string())).await;
                    }
                }
                BackendCommand::Remove(id) => {
                    if let Err(e) = self.queue_manager.remove_task(&id).await {
                        self.send(BackendEvent::Error(e.to_string())).await;
                    }
                }
                BackendCommand::ClearFinished => {
                    let cleared = self.queue_manager.clear_finished().await;
                    self.send(BackendEvent::Cleared(cleared)).await;
                }
                BackendCommand::SaveSettings(settings) => {
                    self.handle_save_settings(settings).await;
                }
                BackendCommand::FetchThumbnail { url } => self.handle_fetch_thumbnail(url),
                BackendCommand::Shutdown => {
                    info!("BackendActor shutting down");
                    break;
                }
            }
        }

        self.queue_manager.shutdown(SHUTDOWN_GRACE).await;
        stop.cancel();
        let _ = monitor.await;
        let _ = forwarder.await;

        // Final state after shutdown
        let tasks = self.queue_manager.get_all_tasks().await;
        let stats = self.queue_manager.stats().await;
        self.send(BackendEvent::Snapshot { tasks, stats }).await;
        self.send(BackendEvent::Stopped).await;
        info!("BackendActor stopped");
    }

    async fn send(&self, event: BackendEvent) {
        if self.sender.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }

    /// Analysis runs off the command loop so cancels stay responsive
    fn handle_analyze(&self, url: String) {
        let analyzer = Arc::clone(&self.analyzer);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let _ = sender
                .send(BackendEvent::AnalysisStarted { url: url.clone() })
                .await;
            let result = analyzer.analyze(&url).await.map_err(|e| e.to_string());
            let _ = sender
                .send(BackendEvent::AnalysisCompleted { url, result })
                .await;
        });
    }

    fn handle_fetch_thumbnail(&self, url: String) {
        let client = self.http.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let thumbnail = fetch_thumbnail(&client, &url).await;
            let _ = sender
                .send(BackendEvent::ThumbnailReady { url, thumbnail })
                .await;
        });
    }

    async fn handle_enqueue(&self, url: String, options: DownloadOptions) {
        match self.queue_manager.enqueue(&url, options).await {
            Ok(task_id) => self.send(BackendEvent::TaskQueued { task_id, url }).await,
            Err(e) => {
                warn!("Failed to enqueue {}: {}", url, e);
                self.send(BackendEvent::EnqueueFailed {
                    url,
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn handle_enqueue_selected(&self, items: Vec<PreviewItem>, kinds: DownloadKinds) {
        let plan = match plan_downloads(&items, kinds, &self.settings) {
            Ok(plan) => plan,
            Err(e) => {
                self.send(BackendEvent::Error(e.to_string())).await;
                return;
            }
        };

        info!("Queueing {} task(s) from selection", plan.len());
        for (url, options) in plan {
            self.handle_enqueue(url, options).await;
        }
    }

    async fn handle_save_settings(&mut self, settings: Settings) {
        let settings = settings.normalized();
        let result = settings
            .save_to(&self.settings_path)
            .map_err(|e| format!("{:#}", e));

        match &result {
            Ok(()) => info!("Settings saved to {}", self.settings_path.display()),
            Err(e) => error!("Failed to save settings: {}", e),
        }

        self.queue_manager.update_settings(settings.clone()).await;
        self.settings = settings;
        self.send(BackendEvent::SettingsSaved(result)).await;
    }

    async fn forward_events(
        mut events: broadcast::Receiver<crate::queue::QueueEvent>,
        sender: mpsc::Sender<BackendEvent>,
        stop: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = stop.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => {
                    if sender.send(BackendEvent::Queue(event)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} queue event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn monitor_loop(
        qm: Arc<QueueManager>,
        sender: mpsc::Sender<BackendEvent>,
        stop: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let tasks = qm.get_all_tasks().await;
            let stats = qm.stats().await;
            if sender
                .send(BackendEvent::Snapshot { tasks, stats })
                .await
                .is_err()
            {
                break;
            }
        }
    }
}
