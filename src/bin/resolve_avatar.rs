#![forbid(unsafe_code)]

//! Resolves one channel avatar from the command line and prints the steps
//! that were tried. Handy for checking an API key or a stubborn channel.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use phewtube::{
    config::{
        DEFAULT_ENV_PATH, RuntimeOverrides, YOUTUBE_API_KEY_VAR, resolve_runtime_settings,
        upsert_env_value,
    },
    http::{HttpClient, UreqClient},
    logging,
    security::ensure_not_root,
    youtube::{AvatarResolver, Resolution, ResolverConfig, ScrapePolicy, VideoId},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "resolve_avatar")]
#[command(about = "Find the avatar image of a YouTube channel", long_about = None)]
struct Cli {
    /// Channel URL (`/channel/UC…`, `/@handle`, `/user/…` or `/c/…`).
    channel_url: String,

    /// Secondary channel URL, e.g. the oEmbed `author_url`.
    #[arg(long)]
    author: Option<String>,

    /// Video URL or id used to look the channel up directly.
    #[arg(long)]
    video: Option<String>,

    /// `when-unavailable` or `when-exhausted`; defaults to PHEWTUBE_SCRAPE_POLICY.
    #[arg(long, value_parser = parse_policy)]
    policy: Option<ScrapePolicy>,

    /// Stores this YouTube Data API key in the env file before resolving.
    #[arg(long, value_name = "KEY")]
    save_key: Option<String>,

    #[arg(long, default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
}

fn parse_policy(value: &str) -> Result<ScrapePolicy, String> {
    ScrapePolicy::parse(value).ok_or_else(|| format!("unknown scrape policy {value:?}"))
}

fn main() -> Result<()> {
    logging::init()?;
    ensure_not_root("resolve_avatar")?;
    let cli = Cli::parse();

    if let Some(key) = cli.save_key.as_deref() {
        let key = key.trim();
        if key.is_empty() {
            bail!("--save-key requires a non-empty key");
        }
        upsert_env_value(&cli.env_file, YOUTUBE_API_KEY_VAR, key)
            .with_context(|| format!("saving {YOUTUBE_API_KEY_VAR} to {}", cli.env_file.display()))?;
        info!(path = %cli.env_file.display(), "saved YouTube API key");
    }

    let settings = resolve_runtime_settings(RuntimeOverrides {
        // Only the keys and the scrape policy are read here.
        data_root: Some(PathBuf::new()),
        www_root: Some(PathBuf::new()),
        env_path: Some(cli.env_file.clone()),
        ..RuntimeOverrides::default()
    })?;
    let video = cli
        .video
        .as_deref()
        .map(|value| {
            VideoId::from_url_or_id(value).ok_or_else(|| anyhow!("not a video URL or id: {value}"))
        })
        .transpose()?;

    let client: Arc<dyn HttpClient> = Arc::new(UreqClient::new());
    let config = ResolverConfig::new(settings.youtube_api_key)
        .with_scrape_policy(cli.policy.unwrap_or(settings.scrape_policy));
    let resolver = AvatarResolver::new(client, config);
    let resolution = resolver.resolve_traced(&cli.channel_url, cli.author.as_deref(), video.as_ref());

    print!("{}", render(&resolution));
    if resolution.avatar.is_none() {
        bail!("no avatar found for {}", cli.channel_url);
    }
    Ok(())
}

fn render(resolution: &Resolution) -> String {
    let steps = resolution
        .steps
        .iter()
        .map(|step| format!("{step:?}"))
        .collect::<Vec<_>>()
        .join(" -> ");
    let mut out = String::new();
    if let Some(avatar) = &resolution.avatar {
        out.push_str(avatar);
        out.push('\n');
    }
    if let Some(channel) = &resolution.channel {
        out.push_str(&format!("channel: {channel}\n"));
    }
    out.push_str(&format!("keyed: {:?}\n", resolution.keyed));
    if let Some(step) = resolution.resolved_by {
        out.push_str(&format!("resolved by: {step:?}\n"));
    }
    out.push_str(&format!(
        "steps: {}\n",
        if steps.is_empty() { "none" } else { steps.as_str() }
    ));
    out
}
