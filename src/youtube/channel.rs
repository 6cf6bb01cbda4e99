use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Reserved prefix carried by every canonical channel id.
pub const STRONG_PREFIX: &str = "UC";

static CHANNEL_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"youtube\.com/channel/(UC[a-zA-Z0-9_-]+)").expect("static channel pattern")
});
static CUSTOM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"youtube\.com/c/([a-zA-Z0-9_-]+)").expect("static channel pattern")
});
static USER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"youtube\.com/user/([a-zA-Z0-9_-]+)").expect("static channel pattern")
});
static HANDLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"youtube\.com/@([a-zA-Z0-9_.-]+)").expect("static channel pattern")
});

/// Strong-form channel identifier, directly usable in Data API queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    /// Only values carrying the reserved prefix are strong.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        (trimmed.len() > STRONG_PREFIX.len() && trimmed.starts_with(STRONG_PREFIX))
            .then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn about_url(&self) -> String {
        format!("{}/channel/{}/about", super::WATCH_BASE, self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("{value:?} is not a canonical channel id"))
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

/// What a channel URL names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// Strong form, no lookup needed.
    Id(ChannelId),
    /// `/c/<name>` custom URL.
    Custom(String),
    /// `/user/<name>` legacy username.
    User(String),
    /// `/@<name>` handle.
    Handle(String),
}

impl ChannelRef {
    /// Matches `/channel/`, `/c/`, `/user/` and `/@` URLs in that order.
    pub fn parse(url: &str) -> Option<Self> {
        if let Some(id) = capture(&CHANNEL_ID_PATTERN, url).and_then(|id| ChannelId::parse(&id)) {
            return Some(Self::Id(id));
        }
        if let Some(name) = capture(&CUSTOM_PATTERN, url) {
            return Some(match ChannelId::parse(&name) {
                Some(id) => Self::Id(id),
                None => Self::Custom(name),
            });
        }
        if let Some(name) = capture(&USER_PATTERN, url) {
            return Some(Self::User(name));
        }
        capture(&HANDLE_PATTERN, url).map(Self::Handle)
    }

    pub fn strong(&self) -> Option<&ChannelId> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Name to feed the handle/username/search lookups.
    pub fn weak_name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Custom(name) | Self::User(name) | Self::Handle(name) => Some(name),
        }
    }
}

fn capture(pattern: &Regex, url: &str) -> Option<String> {
    pattern
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_requires_prefix() {
        assert!(ChannelId::parse("UCabc").is_some());
        assert!(ChannelId::parse("UC").is_none());
        assert!(ChannelId::parse("somehandle").is_none());
        assert!(ChannelId::parse("ucabc").is_none());
    }

    #[test]
    fn parses_strong_urls() {
        let parsed = ChannelRef::parse("https://youtube.com/channel/UCxxxx").unwrap();
        assert_eq!(parsed.strong().map(ChannelId::as_str), Some("UCxxxx"));

        let custom_strong = ChannelRef::parse("https://www.youtube.com/c/UCyyyy").unwrap();
        assert_eq!(custom_strong.strong().map(ChannelId::as_str), Some("UCyyyy"));
    }

    #[test]
    fn parses_weak_urls() {
        assert_eq!(
            ChannelRef::parse("https://www.youtube.com/c/SomeName"),
            Some(ChannelRef::Custom("SomeName".into()))
        );
        assert_eq!(
            ChannelRef::parse("https://www.youtube.com/user/legacy"),
            Some(ChannelRef::User("legacy".into()))
        );
        assert_eq!(
            ChannelRef::parse("https://www.youtube.com/@somehandle/videos"),
            Some(ChannelRef::Handle("somehandle".into()))
        );
    }

    #[test]
    fn weak_name_only_for_weak_forms() {
        let handle = ChannelRef::Handle("h".into());
        assert_eq!(handle.weak_name(), Some("h"));
        let strong = ChannelRef::Id(ChannelId::parse("UCz").unwrap());
        assert!(strong.weak_name().is_none());
    }

    #[test]
    fn unrelated_urls_do_not_parse() {
        assert!(ChannelRef::parse("https://example.com/@nope").is_none());
        assert!(ChannelRef::parse("https://www.youtube.com/watch?v=abc").is_none());
    }

    #[test]
    fn channel_id_deserialization_enforces_prefix() {
        let ok: ChannelId = serde_json::from_str("\"UCgood\"").unwrap();
        assert_eq!(ok.about_url(), "https://www.youtube.com/channel/UCgood/about");
        assert!(serde_json::from_str::<ChannelId>("\"handle\"").is_err());
    }
}
