use chrono::{DateTime, Utc};
use serde::Serialize;

/// Events that describe changes in the download queue state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueueEvent {
    /// A new task was added to the queue
    TaskAdded {
        task_id: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker picked the task up
    TaskStarted {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A task completed successfully
    TaskCompleted {
        task_id: String,
        filepath: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A task failed
    TaskFailed {
        task_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    TaskCancelled {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A task was dropped from the registry
    TaskRemoved {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    pub fn task_id(&self) -> &str {
        match self {
            QueueEvent::TaskAdded { task_id, .. }
            | QueueEvent::TaskStarted { task_id, .. }
            | QueueEvent::TaskCompleted { task_id, .. }
            | QueueEvent::TaskFailed { task_id, .. }
            | QueueEvent::TaskCancelled { task_id, .. }
            | QueueEvent::TaskRemoved { task_id, .. } => task_id,
        }
    }

    /// Whether the event reports a task reaching a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEvent::TaskCompleted { .. }
                | QueueEvent::TaskFailed { .. }
                | QueueEvent::TaskCancelled { .. }
        )
    }
}
