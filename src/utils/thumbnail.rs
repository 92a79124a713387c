//! Thumbnail previews
//!
//! Best effort only: every failure degrades to "no thumbnail".

use image::imageops::FilterType;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const THUMBNAIL_WIDTH: u32 = 160;
pub const THUMBNAIL_HEIGHT: u32 = 90;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Decoded, resized RGBA thumbnail
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Fetch and decode a thumbnail, or `None` if anything goes wrong.
pub async fn fetch_thumbnail(client: &Client, url: &str) -> Option<Thumbnail> {
    let response = match client.get(url).timeout(FETCH_TIMEOUT).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            debug!("Thumbnail request for {} returned {}", url, r.status());
            return None;
        }
        Err(e) => {
            debug!("Thumbnail request for {} failed: {}", url, e);
            return None;
        }
    };

    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            debug!("Failed to read thumbnail body from {}: {}", url, e);
            return None;
        }
    };

    decode_thumbnail(&bytes)
}

/// Decode image bytes into a preview-sized thumbnail.
pub fn decode_thumbnail(bytes: &[u8]) -> Option<Thumbnail> {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let resized = img
                .resize_exact(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Lanczos3)
                .to_rgba8();
            Some(Thumbnail {
                width: resized.width(),
                height: resized.height(),
                rgba: resized.into_raw(),
            })
        }
        Err(e) => {
            debug!("Failed to decode thumbnail: {}", e);
            None
        }
    }
}
