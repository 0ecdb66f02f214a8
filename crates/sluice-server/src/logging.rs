//! Structured logging setup based on tracing.

use sluice_config::LogLevel;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pick the filter directive: `RUST_LOG`, then the CLI, then the config file.
pub fn filter_directive(env: Option<String>, cli: Option<&str>, config: LogLevel) -> String {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| cli.map(str::to_string))
        .unwrap_or_else(|| config.as_str().to_string())
}

pub fn build_filter(directive: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| anyhow::anyhow!("Invalid log filter '{}': {}", directive, e))
}

/// Install the global subscriber
pub fn init_logging(directive: &str, json: bool) -> anyhow::Result<()> {
    let filter = build_filter(directive)?;
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true);
        registry.with(layer).try_init()?;
    } else {
        let layer = tracing_subscriber::fmt::layer().with_target(true);
        registry.with(layer).try_init()?;
    }

    tracing::info!("Log filter set to: {}", directive);
    Ok(())
}
