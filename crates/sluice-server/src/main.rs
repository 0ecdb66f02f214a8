use anyhow::Context;
use clap::Parser;
use sluice_config::ConfigManager;
use sluice_gateway::Gateway;
use std::path::PathBuf;
use tracing::{error, info, warn};

mod app;
mod cli;
mod logging;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = sluice_config::expand_tilde(&cli.config)
        .unwrap_or_else(|| PathBuf::from(&cli.config));

    let mut config = ConfigManager::load(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .into_config();

    // CLI values override the file
    cli.apply_overrides(&mut config);
    ConfigManager::validate(&config).context("Invalid configuration")?;

    let directive = logging::filter_directive(
        std::env::var("RUST_LOG").ok(),
        cli.log_level.as_deref(),
        config.logging.level,
    );
    logging::init_logging(&directive, config.logging.json)?;

    info!("Config loaded from {}", config_path.display());
    info!("Backend: {:?}", cli.backend);
    info!("  Base URL: {}", config.llm.base_url);
    info!("  Model: {}", config.llm.model);

    let backend = app::build_backend(&config, cli.backend)?;
    if !backend.is_configured() {
        warn!(
            "No API key found in ${}; chat requests will fail until it is set",
            config.llm.api_key_env
        );
    }

    let gateway = Gateway::new(app::gateway_config(&config.gateway), backend);

    let shutdown = gateway.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    gateway.run().await.context("Gateway failed")?;
    Ok(())
}
