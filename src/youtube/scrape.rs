//! Best-effort avatar extraction from channel HTML pages.
//!
//! Used only when the Data API cannot be queried. The markup is unstructured
//! and changes without notice, so every failure simply yields `None`.

use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use tracing::debug;

use super::AvatarUrl;
use crate::http::{HttpClient, Request};

pub const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Substring marking YouTube's generic placeholder avatar.
const PLACEHOLDER_MARKER: &str = "default";

const BROWSER_HEADERS: [(&str, &str); 4] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Referer", "https://www.youtube.com/"),
];

static OG_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+property="og:image"\s+content="([^"]+)""#).expect("static og pattern")
});

/// Embedded avatar shapes, tried after `og:image`. Patterns without a capture
/// group yield the whole match.
static EMBEDDED_AVATAR: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(
            r#"(?i)https://yt3\.(?:ggpht\.com|googleusercontent\.com)/[^"'\s<>]+=s\d+-c-k-c0x00ffffff-no-rj"#,
        )
        .expect("static avatar pattern"),
        Regex::new(r#"(?i)"avatar":\s*\{\s*"thumbnails":\s*\[\s*\{\s*"url":\s*"([^"]+)""#)
            .expect("static avatar pattern"),
        Regex::new(r#"(?i)"channelAvatar":\s*\{\s*"thumbnails":\s*\[\s*\{\s*"url":\s*"([^"]+)""#)
            .expect("static avatar pattern"),
    ]
});

/// Fetches `url` with browser-like headers and a hard timeout, then searches
/// the markup. Any failure is logged and reported as `None`.
pub fn scrape_page<C: HttpClient + ?Sized>(client: &C, url: &str) -> Option<AvatarUrl> {
    let request = BROWSER_HEADERS
        .iter()
        .fold(Request::get(url), |request, (name, value)| {
            request.header(name, value)
        })
        .timeout(SCRAPE_TIMEOUT);
    let response = match client.get(&request) {
        Ok(response) => response,
        Err(err) => {
            debug!(%url, error = %err, "channel page fetch failed");
            return None;
        }
    };
    if !response.is_success() {
        debug!(%url, status = response.status, "channel page fetch returned an error status");
        return None;
    }
    let found = find_avatar(&response.body);
    if found.is_none() {
        debug!(%url, bytes = response.body.len(), "no avatar found in channel page");
    }
    found
}

/// `og:image` first, then the embedded patterns in order. Placeholder
/// matches are skipped.
pub fn find_avatar(html: &str) -> Option<AvatarUrl> {
    std::iter::once(&*OG_IMAGE)
        .chain(EMBEDDED_AVATAR.iter())
        .find_map(|pattern| first_usable_match(pattern, html))
}

fn first_usable_match(pattern: &Regex, html: &str) -> Option<AvatarUrl> {
    pattern.captures_iter(html).find_map(|caps| {
        let whole = caps.get(0)?.as_str();
        if whole.contains(PLACEHOLDER_MARKER) {
            return None;
        }
        let url = caps.get(1).map_or(whole, |m| m.as_str());
        Some(unescape_json_url(url))
    })
}

fn unescape_json_url(url: &str) -> String {
    url.replace("\\u0026", "&").replace("\\/", "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ScriptedClient;

    const AVATAR: &str = "https://yt3.ggpht.com/abc123=s176-c-k-c0x00ffffff-no-rj";

    #[test]
    fn prefers_og_image() {
        let html = format!(
            r#"<head><meta property="og:image" content="https://yt3.ggpht.com/og=s900"></head>
            <script>{{"avatar":{{"thumbnails":[{{"url":"{AVATAR}"}}]}}}}</script>"#
        );
        assert_eq!(find_avatar(&html).as_deref(), Some("https://yt3.ggpht.com/og=s900"));
    }

    #[test]
    fn rejects_placeholder_and_falls_through_to_next_pattern() {
        let html = format!(
            r#"<meta property="og:image" content="https://s.ytimg.com/yts/img/default_avatar.jpg">
            <script>"channelAvatar": {{ "thumbnails": [ {{ "url": "{AVATAR}" }} ] }}</script>"#
        );
        assert_eq!(find_avatar(&html).as_deref(), Some(AVATAR));
    }

    #[test]
    fn bare_yt3_urls_are_returned_whole() {
        let html = format!(r#"<img src="{AVATAR}">"#);
        assert_eq!(find_avatar(&html).as_deref(), Some(AVATAR));
    }

    #[test]
    fn placeholder_only_documents_yield_nothing() {
        let html = r#"<meta property="og:image" content="https://yt3.ggpht.com/default=s88">
            "avatar":{"thumbnails":[{"url":"https://yt3.ggpht.com/ytc/default-user=s88"}]}"#;
        assert_eq!(find_avatar(html), None);
        assert_eq!(find_avatar("<html></html>"), None);
    }

    #[test]
    fn embedded_urls_are_unescaped() {
        let html = r#""avatar":{"thumbnails":[{"url":"https:\/\/yt3.googleusercontent.com\/x=s48?a=1&b=2"}]}"#;
        assert_eq!(
            find_avatar(html).as_deref(),
            Some("https://yt3.googleusercontent.com/x=s48?a=1&b=2")
        );
    }

    #[test]
    fn scrape_page_handles_status_and_transport_failures() {
        let client = ScriptedClient::new()
            .respond("https://www.youtube.com/ok", 200, &format!(r#"<img src="{AVATAR}">"#))
            .respond("https://www.youtube.com/gone", 404, "")
            .fail("https://www.youtube.com/slow", "operation timed out");
        assert_eq!(
            scrape_page(&client, "https://www.youtube.com/ok").as_deref(),
            Some(AVATAR)
        );
        assert_eq!(scrape_page(&client, "https://www.youtube.com/gone"), None);
        assert_eq!(scrape_page(&client, "https://www.youtube.com/slow"), None);
    }

    #[test]
    fn scrape_page_sends_browser_headers_with_timeout() {
        let client = ScriptedClient::new().respond("https://www.youtube.com/@someone", 200, "");
        assert_eq!(scrape_page(&client, "https://www.youtube.com/@someone"), None);

        let recorded = client.recorded();
        assert_eq!(recorded.len(), 1);
        let request = &recorded[0];
        assert_eq!(request.timeout, Some(SCRAPE_TIMEOUT));
        assert_eq!(SCRAPE_TIMEOUT, Duration::from_secs(10));
        assert!(
            request
                .header_value("User-Agent")
                .is_some_and(|agent| agent.starts_with("Mozilla/5.0"))
        );
        assert_eq!(request.header_value("Referer"), Some("https://www.youtube.com/"));
        assert_eq!(request.header_value("Accept-Language"), Some("en-US,en;q=0.5"));
    }
}
