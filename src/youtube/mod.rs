//! YouTube-facing pieces: URL parsing, the Data API and oEmbed clients, the
//! HTML scraping fallback and the channel avatar resolver that ties them
//! together.

pub mod channel;
pub mod data_api;
pub mod oembed;
pub mod resolver;
pub mod scrape;
pub mod video_id;

pub use channel::{ChannelId, ChannelRef};
pub use resolver::{
    AvatarResolver, KeyedOutcome, Resolution, ResolverConfig, ScrapePolicy, Step,
};
pub use video_id::{VideoId, extract_video_id};

/// Image location for a channel avatar.
pub type AvatarUrl = String;

pub const WATCH_BASE: &str = "https://www.youtube.com";
pub const DATA_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
