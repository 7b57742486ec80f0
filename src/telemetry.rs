//! Logging and metrics for hosts embedding clup.

pub mod metrics;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize a tracing subscriber for a host binary.
///
/// `RUST_LOG` takes precedence over `level`. The library itself never
/// installs a subscriber.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {e}"))?;

    let builder = fmt().with_env_filter(filter).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
