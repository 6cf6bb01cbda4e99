//! YouTube oEmbed lookups. A 404 from this endpoint means the video does not
//! exist or has embedding disabled; both are reported as [`OEmbedError::NotFound`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::http::{FetchError, HttpClient, Request};

pub const OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OEmbed {
    pub title: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum OEmbedError {
    #[error("video not found or embedding is disabled")]
    NotFound,
    #[error("oEmbed endpoint returned HTTP {0}")]
    Status(u16),
    #[error("malformed oEmbed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid oEmbed URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub fn oembed_url(endpoint: &str, video_url: &str) -> Result<String, url::ParseError> {
    Url::parse_with_params(endpoint, &[("url", video_url), ("format", "json")]).map(String::from)
}

pub fn fetch_oembed<C: HttpClient + ?Sized>(
    client: &C,
    endpoint: &str,
    video_url: &str,
) -> Result<OEmbed, OEmbedError> {
    let url = oembed_url(endpoint, video_url)?;
    debug!(%url, "fetching oEmbed metadata");
    let response = client.get(&Request::get(url).header("Accept", "application/json"))?;
    match response.status {
        404 => Err(OEmbedError::NotFound),
        status if !response.is_success() => Err(OEmbedError::Status(status)),
        _ => Ok(response.json()?),
    }
}
