use clap::{Parser, ValueEnum};
use sluice_config::Config;

/// Which backend chat requests are streamed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// OpenAI-compatible `/chat/completions` endpoint
    Openai,
    /// Scripted replies, no network access
    Mock,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sluice-server")]
#[command(about = "Sluice streaming chat gateway")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(long, env = "SLUICE_CONFIG", default_value = "~/.sluice/config.json")]
    pub config: String,

    /// Gateway bind address (overrides config)
    #[arg(long, env = "SLUICE_BIND")]
    pub bind: Option<String>,

    /// Model name (overrides config)
    #[arg(long, env = "SLUICE_MODEL")]
    pub model: Option<String>,

    /// Backend API base URL (overrides config)
    #[arg(long, env = "SLUICE_BASE_URL")]
    pub base_url: Option<String>,

    /// Log level or filter directive (overrides config; RUST_LOG wins over both)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long, default_value = "false")]
    pub json_logs: bool,

    /// Backend to stream from
    #[arg(long, value_enum, default_value_t = BackendKind::Openai)]
    pub backend: BackendKind,
}

impl Cli {
    /// Apply command-line overrides on top of file configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(bind) = &self.bind {
            config.gateway.bind = bind.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.llm.base_url = base_url.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}
