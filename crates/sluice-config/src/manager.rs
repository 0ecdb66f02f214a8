use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::info;

/// Loads, validates and persists the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load the configuration file, writing defaults if it does not exist
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = tokio::fs::read_to_string(path).await?;
            let content = Self::expand_env_vars(&content)?;
            serde_json::from_str(&content)?
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = serde_json::to_string_pretty(&default_config)?;
            tokio::fs::write(path, &content).await?;
            default_config
        };

        Self::validate(&config)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// Load from `~/.sluice/config.json`
    pub async fn load_default() -> ConfigResult<Self> {
        let config_path = Self::default_config_path()?;
        Self::load(&config_path).await
    }

    pub fn default_config_path() -> ConfigResult<PathBuf> {
        crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
    }

    /// Wrap an in-memory config (used by tests and embedders)
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self { path, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current config back to its file
    pub async fn save(&self) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(&self.config)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// Apply a change, validate it, then persist
    pub async fn update<F>(&mut self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut next = self.config.clone();
        f(&mut next);
        Self::validate(&next)?;
        self.config = next;
        self.save().await
    }

    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.gateway.bind.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Gateway bind address cannot be empty".to_string(),
            ));
        }

        if !config.gateway.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "Gateway path must start with '/': {}",
                config.gateway.path
            )));
        }

        if config.gateway.max_connections == 0 {
            return Err(ConfigError::Validation(
                "Gateway max_connections must be greater than 0".to_string(),
            ));
        }

        if config.gateway.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Gateway heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        if config.gateway.stream_idle_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "Gateway stream_idle_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Expand `${VAR}` and `${VAR:-default}`
    pub(crate) fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_expr = &cap[1];

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
            };

            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_creates_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let manager = ConfigManager::load(&config_path).await.unwrap();

        assert!(config_path.exists());
        assert_eq!(manager.config().gateway.bind, "127.0.0.1:18790");
        assert_eq!(manager.path(), config_path.as_path());
    }

    #[tokio::test]
    async fn test_load_expands_env_vars() {
        std::env::set_var("SLUICE_TEST_MODEL", "gpt-test");
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(
            &config_path,
            r#"{"llm": {"model": "${SLUICE_TEST_MODEL}", "base_url": "${SLUICE_UNSET_URL:-http://localhost:1234/v1}"}}"#,
        )
        .await
        .unwrap();

        let manager = ConfigManager::load(&config_path).await.unwrap();

        assert_eq!(manager.config().llm.model, "gpt-test");
        assert_eq!(manager.config().llm.base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn test_missing_env_var_without_default() {
        let result = ConfigManager::expand_env_vars(r#"{"key": "${SLUICE_DEFINITELY_UNSET}"}"#);
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound(name)) if name == "SLUICE_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(ConfigManager::validate(&config).is_ok());

        config.gateway.path = "ws".to_string();
        assert!(ConfigManager::validate(&config).is_err());

        config.gateway.path = "/ws".to_string();
        config.gateway.heartbeat_interval_secs = 0;
        assert!(ConfigManager::validate(&config).is_err());

        config.gateway.heartbeat_interval_secs = 30;
        config.gateway.stream_idle_timeout_secs = Some(0);
        assert!(ConfigManager::validate(&config).is_err());
    }

    #[tokio::test]
    async fn test_update_persists_valid_change() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let mut manager = ConfigManager::new(Config::default(), config_path.clone());

        manager.update(|c| c.gateway.max_connections = 7).await.unwrap();
        let reloaded = ConfigManager::load(&config_path).await.unwrap();
        assert_eq!(reloaded.config().gateway.max_connections, 7);

        let rejected = manager.update(|c| c.gateway.max_connections = 0).await;
        assert!(rejected.is_err());
        assert_eq!(manager.config().gateway.max_connections, 7);
    }
}
