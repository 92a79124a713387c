//! Download queue: task state machine, bounded worker pool and lifecycle events

pub mod events;
pub mod manager;
pub mod task;

pub use events::QueueEvent;
pub use manager::{QueueManager, QueueStats, TaskRecord};
pub use task::{DownloadTask, TaskStatus};
