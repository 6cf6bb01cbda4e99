//! Installs the process-wide `tracing` subscriber used by every binary.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info,hyper=warn,libsql=warn";

/// Reads `RUST_LOG` when present and falls back to `info`.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .map_err(|err| anyhow!("invalid log filter: {err}"))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!("installing tracing subscriber: {err}"))
}
