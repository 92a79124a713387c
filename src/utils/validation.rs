//! Input validation

use crate::utils::error::VideoloaderError;
use reqwest::Url;

/// Accept only absolute http(s) URLs that name a host.
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url.trim()) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Same as [`is_valid_url`] but as an error for `?` chains.
pub fn validate_url(url: &str) -> Result<(), VideoloaderError> {
    if is_valid_url(url) {
        Ok(())
    } else {
        Err(VideoloaderError::InvalidUrl(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_video_urls() {
        assert!(is_valid_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_valid_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_valid_url("http://localhost:8080/video.mp4"));
        assert!(is_valid_url("http://192.168.1.10/stream"));
        assert!(is_valid_url("  https://vimeo.com/123  "));
    }

    #[test]
    fn rejects_non_http_input() {
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url("ftp://example.com/file"));
        assert!(!is_valid_url("file:///etc/passwd"));
        assert!(!is_valid_url("youtube.com/watch?v=abc"));
    }

    #[test]
    fn validate_url_reports_the_input() {
        match validate_url("nope") {
            Err(VideoloaderError::InvalidUrl(u)) => assert_eq!(u, "nope"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
