//! Download queue manager with a bounded worker pool

use super::events::QueueEvent;
use super::task::{DownloadTask, TaskStatus};
use crate::downloader::options::{resolve, DownloadOptions};
use crate::downloader::progress::{HookAction, ProgressEvent};
use crate::extractor::traits::MediaBackend;
use crate::utils::config::Settings;
use crate::utils::error::{short_message, VideoloaderError};
use crate::utils::validation::validate_url;
use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const ERROR_MESSAGE_LIMIT: usize = 200;
const EVENT_CAPACITY: usize = 256;
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_POLL: Duration = Duration::from_millis(50);

/// A task guarded for one writer (its worker) and many readers
pub type TaskRecord = Arc<StdMutex<DownloadTask>>;

fn lock(record: &StdMutex<DownloadTask>) -> MutexGuard<'_, DownloadTask> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry row
struct TaskEntry {
    id: String,
    record: TaskRecord,
    cancel: CancellationToken,
}

/// Work item handed to the dispatcher, with the settings captured at enqueue time
struct Job {
    url: String,
    options: DownloadOptions,
    settings: Settings,
    record: TaskRecord,
    cancel: CancellationToken,
}

struct WorkerContext {
    backend: Arc<dyn MediaBackend>,
    slots: Arc<Semaphore>,
    events: broadcast::Sender<QueueEvent>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerContext {
    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Counts a worker from dispatch until its transfer call has returned
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Task counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Workers whose transfer has not returned yet. A task can already be
    /// completed by a per-stream "finished" while its merge is still running.
    pub transfers: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.active + self.completed + self.failed + self.cancelled
    }

    /// Nothing waiting and no transfer running
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.active == 0 && self.transfers == 0
    }
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Active: {} | Completed: {} | Failed: {}",
            self.active, self.completed, self.failed
        )
    }
}

/// Download queue manager.
///
/// Tasks start in enqueue order once one of `concurrent_downloads` slots
/// frees up. Must be created inside a tokio runtime.
pub struct QueueManager {
    tasks: Mutex<VecDeque<TaskEntry>>,
    settings: RwLock<Settings>,
    jobs: mpsc::UnboundedSender<Job>,
    context: Arc<WorkerContext>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    accepting: AtomicBool,
    max_concurrent: usize,
}

impl QueueManager {
    /// Create new queue manager; the pool size is fixed from `settings`
    pub fn new(settings: Settings, backend: Arc<dyn MediaBackend>) -> Self {
        let settings = settings.normalized();
        let max_concurrent = settings.concurrent_downloads;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let context = Arc::new(WorkerContext {
            backend,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            events,
            workers: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
        });

        let (jobs, receiver) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(Self::dispatch_loop(receiver, Arc::clone(&context)));

        info!(
            "Queue started with {} download slot(s) using {}",
            max_concurrent,
            context.backend.id()
        );

        Self {
            tasks: Mutex::new(VecDeque::new()),
            settings: RwLock::new(settings),
            jobs,
            context,
            dispatcher: Mutex::new(Some(dispatcher)),
            accepting: AtomicBool::new(true),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Receive lifecycle events for every task
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.context.events.subscribe()
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Replace the settings used for tasks enqueued from now on
    pub async fn update_settings(&self, settings: Settings) {
        let settings = settings.normalized();
        if settings.concurrent_downloads != self.max_concurrent {
            warn!(
                "concurrent_downloads changed to {}; the running queue keeps {} slot(s)",
                settings.concurrent_downloads, self.max_concurrent
            );
        }
        *self.settings.write().await = settings;
    }

    /// Add a URL to the queue and return the new task id
    pub async fn enqueue(&self, url: &str, options: DownloadOptions) -> Result<String> {
        if !self.accepting.load(Ordering::SeqCst) {
            let reason = "queue is shutting down".to_string();
            return Err(VideoloaderError::OperationFailed(reason).into());
        }

        let url = url.trim();
        validate_url(url)?;

        let settings = self.settings.read().await.clone();
        let task = DownloadTask::new(url, options.clone());
        let task_id = task.id.clone();
        let record: TaskRecord = Arc::new(StdMutex::new(task));
        let cancel = CancellationToken::new();

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push_back(TaskEntry {
                id: task_id.clone(),
                record: Arc::clone(&record),
                cancel: cancel.clone(),
            });
        }

        self.context.emit(QueueEvent::TaskAdded {
            task_id: task_id.clone(),
            url: url.to_string(),
            timestamp: Utc::now(),
        });

        let job = Job {
            url: url.to_string(),
            options,
            settings,
            record: Arc::clone(&record),
            cancel,
        };
        if self.jobs.send(job).is_err() {
            lock(&record).cancel();
            let reason = "worker pool is not running".to_string();
            return Err(VideoloaderError::OperationFailed(reason).into());
        }

        info!("Added task {} to queue", task_id);
        Ok(task_id)
    }

    /// Cancel task.
    ///
    /// Pending tasks are cancelled at once. Running tasks are only flagged and
    /// stop at their next checkpoint. Finished tasks are left alone.
    pub async fn cancel_task(&self, task_id: &str) -> Result<()> {
        let cancelled_now = {
            let tasks = self.tasks.lock().await;
            let entry = tasks
                .iter()
                .find(|e| e.id == task_id)
                .ok_or_else(|| VideoloaderError::TaskNotFound(task_id.to_string()))?;

            let mut task = lock(&entry.record);
            match task.status {
                TaskStatus::Pending => {
                    entry.cancel.cancel();
                    task.cancel()
                }
                TaskStatus::Downloading => {
                    entry.cancel.cancel();
                    info!("Cancellation requested for running task {}", task_id);
                    false
                }
                status => {
                    debug!("Task {} already {}, nothing to cancel", task_id, status);
                    false
                }
            }
        };

        if cancelled_now {
            info!("Cancelled queued task {}", task_id);
            self.context.emit(QueueEvent::TaskCancelled {
                task_id: task_id.to_string(),
                timestamp: Utc::now(),
            });
        }

        Ok(())
    }

    /// Drop a task from the registry and return its last snapshot.
    ///
    /// A pending task will never start. A running worker keeps going and its
    /// later updates land on the detached record only.
    pub async fn remove_task(&self, task_id: &str) -> Result<DownloadTask> {
        let entry = {
            let mut tasks = self.tasks.lock().await;
            tasks
                .iter()
                .position(|e| e.id == task_id)
                .and_then(|pos| tasks.remove(pos))
                .ok_or_else(|| VideoloaderError::TaskNotFound(task_id.to_string()))?
        };

        let snapshot = {
            let task = lock(&entry.record);
            if task.status == TaskStatus::Pending {
                entry.cancel.cancel();
            }
            task.clone()
        };

        info!("Removed task {} from queue", task_id);
        self.context.emit(QueueEvent::TaskRemoved {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
        });

        Ok(snapshot)
    }

    /// Remove every completed, failed or cancelled task; returns how many went
    pub async fn clear_finished(&self) -> usize {
        let mut removed = Vec::new();
        {
            let mut tasks = self.tasks.lock().await;
            tasks.retain(|entry| {
                let finished = lock(&entry.record).status.is_terminal();
                if finished {
                    removed.push(entry.id.clone());
                }
                !finished
            });
        }

        for task_id in &removed {
            self.context.emit(QueueEvent::TaskRemoved {
                task_id: task_id.clone(),
                timestamp: Utc::now(),
            });
        }

        info!("Cleared {} finished task(s) from queue", removed.len());
        removed.len()
    }

    /// Snapshot of one task
    pub async fn get_task(&self, task_id: &str) -> Option<DownloadTask> {
        let tasks = self.tasks.lock().await;
        tasks
            .iter()
            .find(|e| e.id == task_id)
            .map(|e| lock(&e.record).clone())
    }

    /// Snapshots of all tasks in enqueue order
    pub async fn get_all_tasks(&self) -> Vec<DownloadTask> {
        let tasks = self.tasks.lock().await;
        tasks.iter().map(|e| lock(&e.record).clone()).collect()
    }

    pub async fn stats(&self) -> QueueStats {
        let tasks = self.tasks.lock().await;
        let mut stats = QueueStats {
            transfers: self.context.in_flight.load(Ordering::SeqCst),
            ..QueueStats::default()
        };
        for entry in tasks.iter() {
            match lock(&entry.record).status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Downloading => stats.active += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Resolve once no registered task is pending or downloading and every
    /// started transfer has returned
    pub async fn wait_idle(&self) {
        while !self.stats().await.is_idle() {
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Stop the queue.
    ///
    /// Pending tasks become cancelled. Running tasks get `grace` to finish,
    /// are then asked to cancel, and any still unfinished after a short join
    /// are recorded as cancelled.
    pub async fn shutdown(&self, grace: Duration) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down download queue");

        let mut cancelled = Vec::new();
        {
            let tasks = self.tasks.lock().await;
            for entry in tasks.iter() {
                let mut task = lock(&entry.record);
                if task.status == TaskStatus::Pending {
                    entry.cancel.cancel();
                    if task.cancel() {
                        cancelled.push(entry.id.clone());
                    }
                }
            }
        }
        self.context.slots.close();

        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            warn!("Downloads still running after {:?}, cancelling them", grace);
            let tasks = self.tasks.lock().await;
            for entry in tasks.iter() {
                entry.cancel.cancel();
            }
        }

        let handles = std::mem::take(&mut *self.context.workers.lock().await);
        if tokio::time::timeout(JOIN_TIMEOUT, join_all(handles)).await.is_err() {
            warn!("Some workers did not stop within {:?}", JOIN_TIMEOUT);
        }

        {
            let tasks = self.tasks.lock().await;
            for entry in tasks.iter() {
                if lock(&entry.record).cancel() {
                    cancelled.push(entry.id.clone());
                }
            }
        }

        for task_id in cancelled {
            self.context.emit(QueueEvent::TaskCancelled {
                task_id,
                timestamp: Utc::now(),
            });
        }

        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            dispatcher.abort();
        }
        info!("Download queue stopped");
    }

    /// Start jobs in arrival order as slots free up
    async fn dispatch_loop(mut jobs: mpsc::UnboundedReceiver<Job>, context: Arc<WorkerContext>) {
        while let Some(job) = jobs.recv().await {
            let permit = tokio::select! {
                biased;
                _ = job.cancel.cancelled() => {
                    debug!("Skipping cancelled job for {}", job.url);
                    continue;
                }
                permit = Arc::clone(&context.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        debug!("Worker pool closed, dispatcher exiting");
                        break;
                    }
                },
            };

            let guard = InFlight::new(&context.in_flight);
            let handle = tokio::spawn(Self::run_worker(Arc::clone(&context), job, permit, guard));
            let mut workers = context.workers.lock().await;
            workers.retain(|h| !h.is_finished());
            workers.push(handle);
        }
    }

    /// Drive one task to a terminal state while holding a pool slot
    async fn run_worker(
        context: Arc<WorkerContext>,
        job: Job,
        _permit: OwnedSemaphorePermit,
        _in_flight: InFlight,
    ) {
        let (task_id, started) = {
            let mut task = lock(&job.record);
            (task.id.clone(), task.mark_downloading())
        };
        if !started {
            debug!("Task {} is no longer pending, not starting it", task_id);
            return;
        }

        info!("Started download for task {}", task_id);
        context.emit(QueueEvent::TaskStarted {
            task_id: task_id.clone(),
            timestamp: Utc::now(),
        });

        let outcome = Self::execute(context.backend.as_ref(), &job).await;

        let event = {
            let mut task = lock(&job.record);
            match outcome {
                Ok(()) => {
                    // "finished" may have come per stream; close it out here otherwise
                    task.complete();
                }
                Err(e) if job.cancel.is_cancelled() || VideoloaderError::is_cancelled(&e) => {
                    task.cancel();
                }
                Err(e) if task.status.is_terminal() => {
                    warn!(
                        "Task {} already {} when its transfer failed: {:#}",
                        task_id, task.status, e
                    );
                }
                Err(e) => {
                    error!("Task {} failed: {:#}", task_id, e);
                    task.fail(short_message(&format!("{:#}", e), ERROR_MESSAGE_LIMIT));
                }
            }
            terminal_event(&task)
        };

        if let Some(event) = event {
            match &event {
                QueueEvent::TaskCompleted { .. } => {
                    info!("Task {} completed successfully", task_id)
                }
                QueueEvent::TaskCancelled { .. } => info!("Task {} was cancelled", task_id),
                _ => {}
            }
            context.emit(event);
        }
    }

    async fn execute(backend: &dyn MediaBackend, job: &Job) -> Result<()> {
        let resolved = resolve(&job.options, &job.settings);

        if let Some(tag) = resolved.title_tag {
            let mut task = lock(&job.record);
            let current = task.title.clone();
            task.set_title(Some(tag), &current);
        }

        tokio::fs::create_dir_all(&resolved.output_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create output directory {}",
                    resolved.output_dir.display()
                )
            })?;

        let info = backend.extract_info(&job.url).await?;
        if let Some(title) = info.title.as_deref() {
            lock(&job.record).set_title(resolved.title_tag, title);
        }

        if job.cancel.is_cancelled() {
            return Err(VideoloaderError::Cancelled.into());
        }

        let record = Arc::clone(&job.record);
        let cancel = job.cancel.clone();
        let hook = move |event: &ProgressEvent| {
            if cancel.is_cancelled() {
                return HookAction::Abort;
            }
            lock(&record).apply_progress(event);
            HookAction::Continue
        };

        debug!("Transferring {} with format {:?}", job.url, resolved.options.format);
        backend.download(&job.url, &resolved.options, &hook).await
    }
}

fn terminal_event(task: &DownloadTask) -> Option<QueueEvent> {
    let task_id = task.id.clone();
    let timestamp = Utc::now();
    match task.status {
        TaskStatus::Completed => Some(QueueEvent::TaskCompleted {
            task_id,
            filepath: Some(task.filepath.clone()).filter(|p| !p.is_empty()),
            timestamp,
        }),
        TaskStatus::Failed => Some(QueueEvent::TaskFailed {
            task_id,
            error: task.error.clone().unwrap_or_default(),
            timestamp,
        }),
        TaskStatus::Cancelled => Some(QueueEvent::TaskCancelled { task_id, timestamp }),
        TaskStatus::Pending | TaskStatus::Downloading => None,
    }
}
