//! Progress payloads reported by the extraction library

use regex::Regex;

/// Status tag of a progress callback
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressStatus {
    Downloading,
    Finished,
    /// Anything else the library reports (e.g. "error"); ignored by tasks
    Other(String),
}

impl ProgressStatus {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "downloading" => ProgressStatus::Downloading,
            "finished" => ProgressStatus::Finished,
            other => ProgressStatus::Other(other.to_string()),
        }
    }
}

/// One progress callback invocation.
///
/// Auxiliary fields are raw display strings straight from the library and may
/// be absent or malformed; consumers must tolerate both.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub percent_str: Option<String>,
    pub speed_str: Option<String>,
    pub eta_str: Option<String>,
    pub total_bytes: Option<u64>,
    pub filename: Option<String>,
}

impl ProgressEvent {
    pub fn downloading(percent: &str) -> Self {
        Self {
            status: ProgressStatus::Downloading,
            percent_str: Some(percent.to_string()),
            speed_str: None,
            eta_str: None,
            total_bytes: None,
            filename: None,
        }
    }

    pub fn finished(filename: Option<&str>) -> Self {
        Self {
            status: ProgressStatus::Finished,
            percent_str: None,
            speed_str: None,
            eta_str: None,
            total_bytes: None,
            filename: filename.map(str::to_string),
        }
    }

    /// Percentage parsed from `percent_str`, clamped to [0, 100].
    pub fn percent(&self) -> Option<f64> {
        self.percent_str.as_deref().and_then(parse_percent)
    }
}

/// What the progress hook wants the transfer to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    Abort,
}

/// Callback invoked synchronously from inside a transfer.
///
/// Must only do cheap, non-blocking updates.
pub type ProgressHook = dyn Fn(&ProgressEvent) -> HookAction + Send + Sync;

/// Parse strings like `" 42.5%"`, possibly wrapped in ANSI color codes.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let cleaned = strip_ansi(raw);
    let number = cleaned.trim().trim_end_matches('%').trim();
    let value = number.parse::<f64>().ok()?;
    if value.is_finite() {
        Some(value.clamp(0.0, 100.0))
    } else {
        None
    }
}

lazy_static::lazy_static! {
    static ref ANSI_RE: Option<Regex> = Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").ok();
}

/// Remove `ESC [ ... <letter>` sequences.
pub fn strip_ansi(raw: &str) -> String {
    match ANSI_RE.as_ref() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    }
}

/// Render a byte count the way the download list shows it.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{}MB", bytes / 1024 / 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percent_plain() {
        assert_eq!(parse_percent("42.5%"), Some(42.5));
        assert_eq!(parse_percent("  7.0% "), Some(7.0));
        assert_eq!(parse_percent("100"), Some(100.0));
    }

    #[test]
    fn test_parse_percent_with_color_codes() {
        assert_eq!(parse_percent("\u{1b}[0;94m 55.1%\u{1b}[0m"), Some(55.1));
    }

    #[test]
    fn test_parse_percent_rejects_garbage() {
        assert_eq!(parse_percent("?%"), None);
        assert_eq!(parse_percent(""), None);
        assert_eq!(parse_percent("NA"), None);
        assert_eq!(parse_percent("nan%"), None);
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\u{1b}[0;94m 55.1%\u{1b}[0m"), " 55.1%");
        assert_eq!(strip_ansi("\u{1b}[K1.2MiB/s"), "1.2MiB/s");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_parse_percent_clamps() {
        assert_eq!(parse_percent("150%"), Some(100.0));
        assert_eq!(parse_percent("-3%"), Some(0.0));
    }

    #[test]
    fn test_status_tags() {
        assert_eq!(ProgressStatus::parse("downloading"), ProgressStatus::Downloading);
        assert_eq!(ProgressStatus::parse(" finished "), ProgressStatus::Finished);
        assert_eq!(
            ProgressStatus::parse("error"),
            ProgressStatus::Other("error".to_string())
        );
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(0), "0MB");
        assert_eq!(format_megabytes(5 * 1024 * 1024 + 10), "5MB");
    }
}
