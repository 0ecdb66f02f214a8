use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Read a value by dotted key, e.g. `gateway.bind`
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["gateway", "bind"] => Some(self.gateway.bind.clone()),
            ["gateway", "path"] => Some(self.gateway.path.clone()),
            ["gateway", "max_connections"] => Some(self.gateway.max_connections.to_string()),
            ["gateway", "heartbeat_interval_secs"] => {
                Some(self.gateway.heartbeat_interval_secs.to_string())
            }
            ["gateway", "stream_idle_timeout_secs"] => {
                self.gateway.stream_idle_timeout_secs.map(|v| v.to_string())
            }
            ["llm", "base_url"] => Some(self.llm.base_url.clone()),
            ["llm", "model"] => Some(self.llm.model.clone()),
            ["llm", "api_key_env"] => Some(self.llm.api_key_env.clone()),
            ["llm", "timeout_seconds"] => Some(self.llm.timeout_seconds.to_string()),
            ["llm", "system_prompt"] => self.llm.system_prompt.clone(),
            ["logging", "level"] => Some(self.logging.level.to_string()),
            ["logging", "json"] => Some(self.logging.json.to_string()),
            _ => None,
        }
    }

    /// Set a value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["gateway", "bind"] => {
                self.gateway.bind = value.to_string();
            }
            ["gateway", "path"] => {
                self.gateway.path = value.to_string();
            }
            ["gateway", "max_connections"] => {
                self.gateway.max_connections = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid number: {}", value))
                })?;
            }
            ["gateway", "heartbeat_interval_secs"] => {
                self.gateway.heartbeat_interval_secs = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid number: {}", value))
                })?;
            }
            ["gateway", "stream_idle_timeout_secs"] => {
                self.gateway.stream_idle_timeout_secs = Some(value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid number: {}", value))
                })?);
            }
            ["llm", "base_url"] => {
                self.llm.base_url = value.to_string();
            }
            ["llm", "model"] => {
                self.llm.model = value.to_string();
            }
            ["llm", "api_key_env"] => {
                self.llm.api_key_env = value.to_string();
            }
            ["llm", "timeout_seconds"] => {
                self.llm.timeout_seconds = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid number: {}", value))
                })?;
            }
            ["llm", "system_prompt"] => {
                self.llm.system_prompt = Some(value.to_string());
            }
            ["logging", "level"] => {
                self.logging.level = value.parse()?;
            }
            ["logging", "json"] => {
                self.logging.json = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid boolean: {}", value))
                })?;
            }
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }
}

/// Gateway settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address (e.g., "127.0.0.1:18790")
    pub bind: String,
    /// Path clients must request when upgrading
    pub path: String,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
    /// Fail a request when the backend is silent for this long
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_idle_timeout_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:18790".to_string(),
            path: "/ws".to_string(),
            max_connections: 1000,
            heartbeat_interval_secs: 30,
            stream_idle_timeout_secs: None,
        }
    }
}

/// Backend (OpenAI-compatible) settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. Read per request.
    pub api_key_env: String,
    pub timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_seconds: 60,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            headers: None,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.bind, "127.0.0.1:18790");
        assert_eq!(config.gateway.path, "/ws");
        assert_eq!(config.gateway.heartbeat_interval_secs, 30);
        assert_eq!(config.gateway.stream_idle_timeout_secs, None);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"gateway": {"bind": "0.0.0.0:9000"}}"#).unwrap();
        assert_eq!(config.gateway.bind, "0.0.0.0:9000");
        assert_eq!(config.gateway.path, "/ws");
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_get_and_set_value() {
        let mut config = Config::default();
        config.set_value("gateway.max_connections", "5").unwrap();
        config.set_value("logging.level", "WARNING").unwrap();
        config.set_value("gateway.stream_idle_timeout_secs", "90").unwrap();

        assert_eq!(config.get_value("gateway.max_connections").as_deref(), Some("5"));
        assert_eq!(config.get_value("logging.level").as_deref(), Some("warn"));
        assert_eq!(
            config.get_value("gateway.stream_idle_timeout_secs").as_deref(),
            Some("90")
        );
        assert!(config.get_value("llm.system_prompt").is_none());
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = Config::default();
        assert!(matches!(
            config.set_value("gateway.max_connections", "many"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            config.set_value("gateway.colour", "blue"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }
}
