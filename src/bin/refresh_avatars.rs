#![forbid(unsafe_code)]

//! Nightly job that retries avatar resolution for every channel stored
//! without one. Meant to run from cron next to the backend.

use anyhow::{Context, Result, anyhow, bail};
use phewtube::{
    catalog::{CATALOG_DB_FILE, Catalog, Channel},
    config::{RuntimeOverrides, resolve_runtime_settings},
    http::{HttpClient, UreqClient},
    logging,
    security::ensure_not_root,
    youtube::{AvatarResolver, ResolverConfig},
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct RefreshArgs {
    data_root: Option<PathBuf>,
    dry_run: bool,
}

impl RefreshArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut data_root_override: Option<PathBuf> = None;
        let mut dry_run = false;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--data-root=") {
                data_root_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--data-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--data-root requires a value"))?;
                    data_root_override = Some(PathBuf::from(value));
                }
                "--dry-run" => dry_run = true,
                _ => {
                    bail!("unknown argument: {arg}");
                }
            }
        }

        Ok(Self {
            data_root: data_root_override,
            dry_run,
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RefreshSummary {
    checked: usize,
    updated: usize,
    unresolved: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;
    ensure_not_root("refresh_avatars")?;
    let args = RefreshArgs::parse()?;
    let settings = resolve_runtime_settings(RuntimeOverrides {
        data_root: args.data_root.clone(),
        // Nothing is served, so WWW_ROOT may be unset.
        www_root: Some(PathBuf::new()),
        ..RuntimeOverrides::default()
    })?;

    let data_root = settings.data_root;
    let catalog = Catalog::open(&data_root.join(CATALOG_DB_FILE))
        .await
        .with_context(|| format!("opening catalog under {}", data_root.display()))?;
    let client: Arc<dyn HttpClient> = Arc::new(UreqClient::new());
    let resolver = AvatarResolver::new(
        client,
        ResolverConfig::new(settings.youtube_api_key).with_scrape_policy(settings.scrape_policy),
    );

    let summary = refresh_missing_avatars(&catalog, &resolver, args.dry_run).await?;
    info!(
        checked = summary.checked,
        updated = summary.updated,
        unresolved = summary.unresolved.len(),
        dry_run = args.dry_run,
        "avatar refresh finished"
    );
    for name in &summary.unresolved {
        warn!(channel = %name, "avatar still missing");
    }
    Ok(())
}

async fn refresh_missing_avatars(
    catalog: &Catalog,
    resolver: &AvatarResolver,
    dry_run: bool,
) -> Result<RefreshSummary> {
    let channels = catalog.channels_missing_avatar().await?;
    let mut summary = RefreshSummary {
        checked: channels.len(),
        ..RefreshSummary::default()
    };

    for channel in channels {
        let Some(avatar) = resolve_channel(resolver, &channel).await? else {
            summary.unresolved.push(channel.name);
            continue;
        };
        if dry_run {
            info!(channel = %channel.name, %avatar, "would store avatar");
            summary.updated += 1;
            continue;
        }
        if catalog.set_channel_avatar(&channel.id, &avatar).await? {
            info!(channel = %channel.name, %avatar, "stored avatar");
            summary.updated += 1;
        }
    }
    Ok(summary)
}

async fn resolve_channel(resolver: &AvatarResolver, channel: &Channel) -> Result<Option<String>> {
    let Some(source_url) = channel.source_url.clone() else {
        return Ok(None);
    };
    let resolver = resolver.clone();
    tokio::task::spawn_blocking(move || resolver.resolve(&source_url, None, None))
        .await
        .context("avatar resolution task panicked")
}
