//! Utility modules for error handling, configuration and small helpers

pub mod config;
pub mod error;
pub mod paths;
pub mod thumbnail;
pub mod validation;

// Re-export for convenience
pub use config::Settings;
pub use error::{short_message, VideoloaderError};
pub use paths::{default_output_dir, settings_file};
pub use thumbnail::{fetch_thumbnail, Thumbnail};
pub use validation::{is_valid_url, validate_url};
