//! Stress tests for QueueManager
//!
//! These tests attempt to break the registry by randomly interleaving
//! removals, cancellations and reads while workers keep writing progress.
//!
//! Invariants tested:
//! A - Concurrency Bound: downloading tasks <= concurrent_downloads
//! B - No Duplicates: every id appears at most once in a snapshot
//! C - No Ghosts: a removed id never shows up again
//! D - Eventual Progress: every remaining task reaches a terminal state

mod common;

use common::{test_settings, MockBackend, Script};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::sleep;
use videoloader::downloader::DownloadOptions;
use videoloader::extractor::MediaBackend;
use videoloader::queue::{QueueManager, TaskStatus};

async fn create_test_queue_manager(
    max_concurrent: usize,
    script: Script,
) -> (Arc<QueueManager>, Arc<MockBackend>, tempfile::TempDir) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let backend = Arc::new(MockBackend::with_default(script));
    let qm = Arc::new(QueueManager::new(
        test_settings(temp_dir.path(), max_concurrent),
        Arc::clone(&backend) as Arc<dyn MediaBackend>,
    ));
    (qm, backend, temp_dir)
}

// ============================================================================
// INVARIANT CHECKING HELPERS
// ============================================================================

async fn check_invariants(
    qm: &QueueManager,
    max_concurrent: usize,
    removed: &HashSet<String>,
) -> Result<(), String> {
    let tasks = qm.get_all_tasks().await;

    let downloading = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Downloading)
        .count();
    if downloading > max_concurrent {
        return Err(format!(
            "INVARIANT A VIOLATED: {} tasks Downloading, max_concurrent = {}",
            downloading, max_concurrent
        ));
    }

    let mut ids = HashSet::new();
    for task in &tasks {
        if !ids.insert(task.id.clone()) {
            return Err(format!("INVARIANT B VIOLATED: duplicate task id {}", task.id));
        }
        if removed.contains(&task.id) {
            return Err(format!("INVARIANT C VIOLATED: removed task {} is back", task.id));
        }
        if task.status == TaskStatus::Completed && task.progress < 100.0 {
            return Err(format!("task {} completed at {}%", task.id, task.progress));
        }
    }

    Ok(())
}

// ============================================================================
// STRESS TEST: Random removal and cancellation under load
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_test_random_remove_and_cancel() {
    const NUM_TASKS: usize = 40;
    const MAX_CONCURRENT: usize = 4;
    const OPERATION_ROUNDS: usize = 150;

    let (qm, _backend, _dir) =
        create_test_queue_manager(MAX_CONCURRENT, Script::slow(10, Duration::from_millis(2))).await;

    let mut ids = Vec::new();
    for i in 0..NUM_TASKS {
        let url = format!("https://example.com/stress/{}", i);
        ids.push(qm.enqueue(&url, DownloadOptions::default()).await.unwrap());
    }

    let mut removed = HashSet::new();
    let mut rng = rand::thread_rng();

    for round in 0..OPERATION_ROUNDS {
        let task_id = ids[rng.gen_range(0..NUM_TASKS)].clone();

        match rng.gen_range(0..4) {
            0 => {
                if qm.remove_task(&task_id).await.is_ok() {
                    assert!(removed.insert(task_id), "task removed twice");
                }
            }
            1 => {
                let result = qm.cancel_task(&task_id).await;
                assert_eq!(result.is_ok(), !removed.contains(&task_id));
            }
            2 => {
                qm.clear_finished().await;
                for task_id in &ids {
                    if qm.get_task(task_id).await.is_none() {
                        removed.insert(task_id.clone());
                    }
                }
            }
            _ => { /* read-only round */ }
        }

        check_invariants(&qm, MAX_CONCURRENT, &removed)
            .await
            .unwrap_or_else(|e| panic!("round {}: {}", round, e));

        if rng.gen_bool(0.3) {
            sleep(Duration::from_millis(rng.gen_range(1..5))).await;
        }
        tokio::task::yield_now().await;
    }

    tokio::time::timeout(Duration::from_secs(10), qm.wait_idle())
        .await
        .expect("queue never drained");

    check_invariants(&qm, MAX_CONCURRENT, &removed)
        .await
        .expect("final invariant check failed");

    for task in qm.get_all_tasks().await {
        assert!(task.status.is_terminal(), "task {} left in {}", task.id, task.status);
        assert!(task.end_time.is_some());
    }
}

/// Removing a running task detaches it; the worker's later writes go nowhere
#[tokio::test]
async fn test_remove_while_worker_writes_progress() {
    let (qm, backend, _dir) =
        create_test_queue_manager(1, Script::slow(50, Duration::from_millis(2))).await;

    let running = qm
        .enqueue("https://example.com/running", DownloadOptions::default())
        .await
        .unwrap();
    let other = qm
        .enqueue("https://example.com/other", DownloadOptions::default())
        .await
        .unwrap();

    loop {
        let task = qm.get_task(&running).await.unwrap();
        if task.progress > 0.0 {
            break;
        }
        sleep(Duration::from_millis(1)).await;
    }

    let snapshot = qm.remove_task(&running).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Downloading);
    assert!(qm.get_task(&running).await.is_none());

    tokio::time::timeout(Duration::from_secs(5), qm.wait_idle())
        .await
        .expect("queue never drained");

    let tasks = qm.get_all_tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, other);
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert_eq!(backend.started().len(), 2);
}

/// Removing a pending task means it never starts
#[tokio::test]
async fn test_removed_pending_task_never_runs() {
    let (qm, backend, _dir) =
        create_test_queue_manager(1, Script::slow(5, Duration::from_millis(5))).await;

    let first = qm
        .enqueue("https://example.com/first", DownloadOptions::default())
        .await
        .unwrap();
    let second = qm
        .enqueue("https://example.com/second", DownloadOptions::default())
        .await
        .unwrap();

    let snapshot = qm.remove_task(&second).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Pending);

    tokio::time::timeout(Duration::from_secs(5), qm.wait_idle())
        .await
        .expect("queue never drained");
    sleep(Duration::from_millis(20)).await;

    assert_eq!(qm.get_task(&first).await.unwrap().status, TaskStatus::Completed);
    assert_eq!(backend.started(), vec!["https://example.com/first".to_string()]);
}

/// Many producers enqueueing at once still get unique ids and the bound holds
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueue() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 10;
    const MAX_CONCURRENT: usize = 3;

    let (qm, backend, _dir) =
        create_test_queue_manager(MAX_CONCURRENT, Script::slow(2, Duration::from_millis(1))).await;

    let mut handles = Vec::new();
    for p in 0..PRODUCERS {
        let qm = Arc::clone(&qm);
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for i in 0..PER_PRODUCER {
                let url = format!("https://example.com/p{}/{}", p, i);
                ids.push(qm.enqueue(&url, DownloadOptions::default()).await.unwrap());
            }
            ids
        }));
    }

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(all.insert(id), "duplicate id handed out");
        }
    }
    assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);

    tokio::time::timeout(Duration::from_secs(10), qm.wait_idle())
        .await
        .expect("queue never drained");

    let stats = qm.stats().await;
    assert_eq!(stats.completed, PRODUCERS * PER_PRODUCER);
    assert!(backend.peak() <= MAX_CONCURRENT);
}
