//! Data structures for metadata returned by the extraction library

use serde::{Deserialize, Serialize};

/// Metadata for a single video or a collection, as emitted by `yt-dlp -J`.
///
/// Every field is optional: flat collection entries carry only a handful of
/// them, and extractors differ in what they fill in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub webpage_url: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    /// Collection entries; `null` members appear for unavailable items
    pub entries: Option<Vec<Option<MediaInfo>>>,
}

impl MediaInfo {
    /// Page URL if known, else the raw URL field.
    pub fn page_url(&self) -> Option<&str> {
        self.webpage_url.as_deref().or(self.url.as_deref())
    }

    pub fn is_playlist(&self) -> bool {
        self.kind.as_deref() == Some("playlist")
    }

    /// Entries that resolved to something.
    pub fn present_entries(&self) -> impl Iterator<Item = &MediaInfo> {
        self.entries.iter().flatten().flatten()
    }
}

/// JSON document printed by the `info` command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoSummary {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub url: String,
    pub thumbnail: Option<String>,
    pub description: String,
}

/// Maximum description length in [`InfoSummary`], in characters.
pub const DESCRIPTION_LIMIT: usize = 500;

impl InfoSummary {
    pub fn from_info(info: &MediaInfo, requested_url: &str) -> Self {
        let description = info
            .description
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(DESCRIPTION_LIMIT)
            .collect();

        Self {
            title: info.title.clone(),
            uploader: info.uploader.clone(),
            duration: info.duration,
            view_count: info.view_count,
            url: info
                .webpage_url
                .clone()
                .unwrap_or_else(|| requested_url.to_string()),
            thumbnail: info.thumbnail.clone(),
            description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_playlist_with_null_entries() {
        let json = r#"{
            "_type": "playlist",
            "title": "Mix",
            "uploader": "Someone",
            "entries": [
                {"url": "https://example.com/a", "title": "A", "duration": 61.0},
                null,
                {"url": "https://example.com/c"}
            ]
        }"#;
        let info: MediaInfo = serde_json::from_str(json).unwrap();

        assert!(info.is_playlist());
        assert_eq!(info.entries.as_ref().unwrap().len(), 3);
        assert_eq!(info.present_entries().count(), 2);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"title": "T", "formats": [{"format_id": "22"}], "like_count": 5}"#;
        let info: MediaInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.title.as_deref(), Some("T"));
    }

    #[test]
    fn summary_truncates_description_by_characters() {
        let info = MediaInfo {
            title: Some("T".into()),
            description: Some("é".repeat(800)),
            ..Default::default()
        };
        let summary = InfoSummary::from_info(&info, "https://example.com/v");

        assert_eq!(summary.description.chars().count(), DESCRIPTION_LIMIT);
        assert_eq!(summary.url, "https://example.com/v");
    }

    #[test]
    fn summary_prefers_webpage_url_and_keeps_key_order() {
        let info = MediaInfo {
            webpage_url: Some("https://example.com/canonical".into()),
            ..Default::default()
        };
        let summary = InfoSummary::from_info(&info, "https://short.example/v");
        let json = serde_json::to_string(&summary).unwrap();

        assert!(json.contains("https://example.com/canonical"));
        let keys = [
            "title",
            "uploader",
            "duration",
            "view_count",
            "url",
            "thumbnail",
            "description",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| json.find(&format!("\"{}\"", k)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
