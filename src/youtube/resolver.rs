//! Channel identity and avatar resolution.
//!
//! The keyed half walks an ordered list of Data API strategies and stops at
//! the first one that names a channel. The unkeyed half scrapes channel pages.
//! Nothing in here returns an error: every failed step is logged and skipped,
//! and the caller only ever sees an avatar URL or `None`.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use super::data_api::{DataApi, DataApiResult};
use super::{AvatarUrl, ChannelId, ChannelRef, DATA_API_BASE, VideoId, scrape};
use crate::http::HttpClient;

/// Keyed strategies, in the order they are attempted.
const KEYED_STRATEGIES: [Step; 5] = [
    Step::VideoMetadata,
    Step::UrlPattern,
    Step::Handle,
    Step::Username,
    Step::Search,
];

/// When the HTML scraping fallback runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrapePolicy {
    /// Only when no Data API key is configured.
    #[default]
    WhenUnavailable,
    /// Also when the keyed strategies ran and produced no avatar.
    WhenExhausted,
}

impl ScrapePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "when-unavailable" | "unavailable" => Some(Self::WhenUnavailable),
            "when-exhausted" | "exhausted" => Some(Self::WhenExhausted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhenUnavailable => "when-unavailable",
            Self::WhenExhausted => "when-exhausted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub api_key: Option<String>,
    pub data_api_base: String,
    pub scrape_policy: ScrapePolicy,
}

impl ResolverConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            data_api_base: DATA_API_BASE.to_string(),
            scrape_policy: ScrapePolicy::default(),
        }
    }

    pub fn with_scrape_policy(mut self, policy: ScrapePolicy) -> Self {
        self.scrape_policy = policy;
        self
    }
}

/// One state of the resolution walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    VideoMetadata,
    UrlPattern,
    Handle,
    Username,
    Search,
    /// Re-run of the search when a strategy returned a non-canonical id.
    IntegritySearch,
    FetchAvatar,
    ScrapeAbout,
    ScrapeOriginal,
    ScrapeAuthor,
}

/// How the keyed (Data API) half ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyedOutcome {
    /// No API key configured; no keyed request was issued.
    Unavailable,
    /// Keyed strategies ran but produced no avatar.
    Exhausted,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub avatar: Option<AvatarUrl>,
    pub channel: Option<ChannelId>,
    /// Strategy (or scrape step) that produced the result.
    pub resolved_by: Option<Step>,
    pub keyed: KeyedOutcome,
    /// Every step that was attempted, in order.
    pub steps: Vec<Step>,
}

/// Runs `attempt` over `steps` in order and returns the first hit together
/// with the step that produced it.
pub fn first_success<T>(
    steps: &[Step],
    mut attempt: impl FnMut(Step) -> Option<T>,
) -> Option<(Step, T)> {
    steps
        .iter()
        .find_map(|&step| attempt(step).map(|value| (step, value)))
}

fn recover<T>(step: Step, result: DataApiResult<T>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) if err.is_quota() => {
            warn!(?step, error = %err, "YouTube Data API quota exhausted, skipping step");
            None
        }
        Err(err) => {
            debug!(?step, error = %err, "resolution step failed");
            None
        }
    }
}

fn is_youtube_url(value: &str) -> bool {
    Url::parse(value)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| host == "youtube.com" || host.ends_with(".youtube.com"))
}

struct Inputs<'a> {
    channel_url: &'a str,
    author_url: Option<&'a str>,
    video_id: Option<&'a VideoId>,
    channel_ref: Option<ChannelRef>,
}

struct KeyedRun {
    status: KeyedOutcome,
    channel: Option<ChannelId>,
    avatar: Option<AvatarUrl>,
    resolved_by: Option<Step>,
}

impl KeyedRun {
    fn unavailable() -> Self {
        Self {
            status: KeyedOutcome::Unavailable,
            channel: None,
            avatar: None,
            resolved_by: None,
        }
    }
}

/// Resolves channel avatars. Cheap to clone; holds no per-call state.
#[derive(Clone)]
pub struct AvatarResolver {
    client: Arc<dyn HttpClient>,
    config: ResolverConfig,
}

impl AvatarResolver {
    pub fn new(client: Arc<dyn HttpClient>, config: ResolverConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    /// Best avatar for the channel behind `channel_url`, or `None`.
    pub fn resolve(
        &self,
        channel_url: &str,
        author_url: Option<&str>,
        video_id: Option<&VideoId>,
    ) -> Option<AvatarUrl> {
        self.resolve_traced(channel_url, author_url, video_id).avatar
    }

    /// Same as [`resolve`](Self::resolve) but also reports how the result
    /// was reached.
    pub fn resolve_traced(
        &self,
        channel_url: &str,
        author_url: Option<&str>,
        video_id: Option<&VideoId>,
    ) -> Resolution {
        let channel_ref =
            ChannelRef::parse(channel_url).or_else(|| author_url.and_then(ChannelRef::parse));
        let inputs = Inputs {
            channel_url,
            author_url,
            video_id,
            channel_ref,
        };
        let mut steps = Vec::new();

        let keyed = match self.config.api_key.as_deref() {
            Some(key) => self.resolve_keyed(key, &inputs, &mut steps),
            None => KeyedRun::unavailable(),
        };

        let should_scrape = match keyed.status {
            KeyedOutcome::Resolved => false,
            KeyedOutcome::Unavailable => true,
            KeyedOutcome::Exhausted => self.config.scrape_policy == ScrapePolicy::WhenExhausted,
        };

        let mut resolution = Resolution {
            avatar: keyed.avatar,
            channel: keyed.channel,
            resolved_by: keyed.resolved_by,
            keyed: keyed.status,
            steps: Vec::new(),
        };

        if should_scrape {
            let known = resolution
                .channel
                .clone()
                .or_else(|| inputs.channel_ref.as_ref().and_then(ChannelRef::strong).cloned());
            if let Some((step, avatar)) = self.scrape(&inputs, known.as_ref(), &mut steps) {
                resolution.avatar = Some(avatar);
                resolution.resolved_by = Some(step);
                resolution.channel = resolution.channel.or(known);
            }
        }

        resolution.steps = steps;
        match &resolution.avatar {
            Some(avatar) => info!(
                channel_url,
                channel = resolution.channel.as_ref().map(ChannelId::as_str),
                resolved_by = ?resolution.resolved_by,
                %avatar,
                "resolved channel avatar"
            ),
            None => info!(
                channel_url,
                keyed = ?resolution.keyed,
                steps = resolution.steps.len(),
                "channel avatar unresolved"
            ),
        }
        resolution
    }

    fn resolve_keyed(&self, key: &str, inputs: &Inputs<'_>, steps: &mut Vec<Step>) -> KeyedRun {
        let api = DataApi::new(&*self.client, &self.config.data_api_base, key);

        let found = first_success(&KEYED_STRATEGIES, |step| {
            self.run_strategy(&api, step, inputs, steps)
        });
        let Some((strategy, candidate)) = found else {
            debug!(channel_url = inputs.channel_url, "no strategy named a channel");
            return KeyedRun {
                status: KeyedOutcome::Exhausted,
                channel: None,
                avatar: None,
                resolved_by: None,
            };
        };

        let channel = match ChannelId::parse(&candidate) {
            Some(id) => Some(id),
            None => {
                debug!(%candidate, "strategy returned a non-canonical id, searching again");
                steps.push(Step::IntegritySearch);
                recover(Step::IntegritySearch, api.search_channel_id(&candidate))
                    .and_then(|found| ChannelId::parse(&found))
            }
        };
        let Some(channel) = channel else {
            return KeyedRun {
                status: KeyedOutcome::Exhausted,
                channel: None,
                avatar: None,
                resolved_by: None,
            };
        };

        steps.push(Step::FetchAvatar);
        let avatar = recover(Step::FetchAvatar, api.channel_avatar(&channel));
        KeyedRun {
            status: if avatar.is_some() {
                KeyedOutcome::Resolved
            } else {
                KeyedOutcome::Exhausted
            },
            channel: Some(channel),
            avatar,
            resolved_by: Some(strategy),
        }
    }

    /// Returns `None` without recording the step when it does not apply to
    /// the inputs (no video id, no weak name, ...).
    fn run_strategy<C: HttpClient + ?Sized>(
        &self,
        api: &DataApi<'_, C>,
        step: Step,
        inputs: &Inputs<'_>,
        steps: &mut Vec<Step>,
    ) -> Option<String> {
        let weak_name = inputs.channel_ref.as_ref().and_then(ChannelRef::weak_name);
        match step {
            Step::VideoMetadata => {
                let video = inputs.video_id?;
                steps.push(step);
                recover(step, api.channel_id_for_video(video))
            }
            Step::UrlPattern => {
                steps.push(step);
                inputs
                    .channel_ref
                    .as_ref()
                    .and_then(ChannelRef::strong)
                    .map(|id| id.as_str().to_string())
            }
            Step::Handle => {
                let name = weak_name?;
                steps.push(step);
                recover(step, api.channel_id_for_handle(name))
            }
            Step::Username => {
                let name = weak_name?;
                steps.push(step);
                recover(step, api.channel_id_for_username(name))
            }
            Step::Search => {
                let name = weak_name?;
                steps.push(step);
                recover(step, api.search_channel_id(name))
            }
            _ => None,
        }
    }

    fn scrape(
        &self,
        inputs: &Inputs<'_>,
        known: Option<&ChannelId>,
        steps: &mut Vec<Step>,
    ) -> Option<(Step, AvatarUrl)> {
        let mut targets = Vec::new();
        if let Some(id) = known {
            targets.push((Step::ScrapeAbout, id.about_url()));
        }
        targets.push((Step::ScrapeOriginal, inputs.channel_url.to_string()));
        if let Some(author) = inputs.author_url
            && author != inputs.channel_url
        {
            targets.push((Step::ScrapeAuthor, author.to_string()));
        }

        targets.into_iter().find_map(|(step, url)| {
            if !is_youtube_url(&url) {
                debug!(%url, "refusing to scrape a non-YouTube URL");
                return None;
            }
            steps.push(step);
            scrape::scrape_page(&*self.client, &url).map(|avatar| (step, avatar))
        })
    }
}
