pub mod config;
pub mod manager;

pub use config::{
    Config, ConfigError, ConfigResult, GatewayConfig, LlmConfig, LogLevel, LoggingConfig,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// Sluice configuration directory (`~/.sluice`)
pub fn sluice_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".sluice"))
}

/// Default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    sluice_dir().map(|dir| dir.join("config.json"))
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir().map(|home| home.join(rest))
    } else {
        Some(PathBuf::from(path))
    }
}
