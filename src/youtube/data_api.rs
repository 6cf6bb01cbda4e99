//! Thin client for the handful of YouTube Data API v3 queries the resolver
//! needs. Each query returns `Ok(None)` when the API answered but had nothing
//! usable, and an error when the call itself failed.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::{AvatarUrl, ChannelId, VideoId};
use crate::http::{FetchError, HttpClient, Request};
use crate::security::redact_key;

/// 403 reasons that mean the key ran out of quota rather than being invalid.
const QUOTA_REASONS: [&str; 4] = [
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

#[derive(Debug, Error)]
pub enum DataApiError {
    #[error("YouTube Data API quota exhausted ({reason})")]
    Quota { reason: String },
    #[error("YouTube Data API returned HTTP {status}")]
    Status { status: u16 },
    #[error("malformed YouTube Data API response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid YouTube Data API URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl DataApiError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota { .. })
    }
}

pub type DataApiResult<T> = Result<Option<T>, DataApiError>;

#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Option<VideoSnippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: Option<String>,
    snippet: Option<ChannelSnippet>,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: Option<SearchItemId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    channel_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Thumbnails {
    pub high: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    #[serde(rename = "default")]
    pub fallback: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
pub struct Thumbnail {
    pub url: Option<String>,
}

impl Thumbnails {
    /// First present variant in `high`, `medium`, `default` order.
    pub fn best(&self) -> Option<&str> {
        [&self.high, &self.medium, &self.fallback]
            .into_iter()
            .flatten()
            .filter_map(|thumb| thumb.url.as_deref())
            .find(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

fn quota_reason(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    let reason = envelope.error.errors.into_iter().next()?.reason?;
    QUOTA_REASONS.contains(&reason.as_str()).then_some(reason)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub struct DataApi<'a, C: HttpClient + ?Sized> {
    client: &'a C,
    base: &'a str,
    key: &'a str,
}

impl<'a, C: HttpClient + ?Sized> DataApi<'a, C> {
    pub fn new(client: &'a C, base: &'a str, key: &'a str) -> Self {
        Self { client, base, key }
    }

    /// `videos?part=snippet&id=…` → owning channel id.
    pub fn channel_id_for_video(&self, video: &VideoId) -> DataApiResult<String> {
        let items: Vec<VideoItem> = self.list("videos", &[("id", video.as_str())])?;
        Ok(non_empty(
            items
                .into_iter()
                .next()
                .and_then(|item| item.snippet)
                .and_then(|snippet| snippet.channel_id),
        ))
    }

    /// `channels?part=snippet&forHandle=…`.
    pub fn channel_id_for_handle(&self, handle: &str) -> DataApiResult<String> {
        self.first_channel_id(&[("forHandle", handle)])
    }

    /// `channels?part=snippet&forUsername=…` (legacy usernames).
    pub fn channel_id_for_username(&self, username: &str) -> DataApiResult<String> {
        self.first_channel_id(&[("forUsername", username)])
    }

    /// Top `type=channel` search hit for `@<name>`.
    pub fn search_channel_id(&self, name: &str) -> DataApiResult<String> {
        let query = format!("@{}", name.trim_start_matches('@'));
        let items: Vec<SearchItem> = self.list(
            "search",
            &[("q", query.as_str()), ("type", "channel"), ("maxResults", "1")],
        )?;
        Ok(non_empty(
            items
                .into_iter()
                .next()
                .and_then(|item| item.id)
                .and_then(|id| id.channel_id),
        ))
    }

    /// Best thumbnail for a canonical channel id.
    pub fn channel_avatar(&self, channel: &ChannelId) -> DataApiResult<AvatarUrl> {
        let items: Vec<ChannelItem> = self.list("channels", &[("id", channel.as_str())])?;
        let Some(thumbnails) = items
            .into_iter()
            .next()
            .and_then(|item| item.snippet)
            .and_then(|snippet| snippet.thumbnails)
        else {
            return Ok(None);
        };
        Ok(thumbnails.best().map(str::to_string))
    }

    fn first_channel_id(&self, params: &[(&str, &str)]) -> DataApiResult<String> {
        let items: Vec<ChannelItem> = self.list("channels", params)?;
        Ok(non_empty(items.into_iter().next().and_then(|item| item.id)))
    }

    fn list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, DataApiError> {
        let url = self.endpoint_url(endpoint, params)?;
        debug!(url = %redact_key(&url, Some(self.key)), "querying YouTube Data API");
        let response = self.client.get(&Request::get(url))?;
        if !response.is_success() {
            if response.status == 403
                && let Some(reason) = quota_reason(&response.body)
            {
                return Err(DataApiError::Quota { reason });
            }
            return Err(DataApiError::Status {
                status: response.status,
            });
        }
        let list: ItemList<T> = response.json()?;
        Ok(list.items)
    }

    fn endpoint_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, DataApiError> {
        let mut pairs = vec![("part", "snippet")];
        pairs.extend_from_slice(params);
        pairs.push(("key", self.key));
        let url = Url::parse_with_params(
            &format!("{}/{endpoint}", self.base.trim_end_matches('/')),
            &pairs,
        )?;
        Ok(url.into())
    }
}
