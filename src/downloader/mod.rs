//! Format selection, per-task options and progress reporting

pub mod format_selector;
pub mod options;
pub mod progress;

// Re-export for convenience
pub use format_selector::{Container, FormatSelector};
pub use options::{
    plan_downloads, resolve, DownloadKind, DownloadKinds, DownloadOptions, ResolvedTransfer,
    TransferOptions,
};
pub use progress::{HookAction, ProgressEvent, ProgressHook, ProgressStatus};
