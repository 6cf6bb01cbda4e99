use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Known video URL shapes, tried in order. The first pattern covers
/// `watch?v=`, `youtu.be/`, `embed/` and `v/`; the second catches `v=` placed
/// after other query parameters.
static VIDEO_URL_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(
            r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/)([^&\n?#]+)",
        )
        .expect("static video pattern"),
        Regex::new(r"youtube\.com/watch\?.*&v=([^&\n?#]+)").expect("static video pattern"),
    ]
});

/// Opaque per-video identifier extracted from a watch/share URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts either a full video URL or a bare id.
    pub fn from_url_or_id(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if let Some(id) = extract_video_id(trimmed) {
            return Some(id);
        }
        let bare = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        bare.then(|| Self(trimmed.to_string()))
    }

    pub fn embed_url(&self) -> String {
        format!("{}/embed/{}", super::WATCH_BASE, self.0)
    }

    pub fn watch_url(&self) -> String {
        format!("{}/watch?v={}", super::WATCH_BASE, self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the first non-empty capture across [`VIDEO_URL_PATTERNS`].
pub fn extract_video_id(url: &str) -> Option<VideoId> {
    VIDEO_URL_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|id| !id.is_empty())
            .map(|id| VideoId(id.to_string()))
    })
}
