use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{ApiKeyAuth, Authenticator, EnvKeyAuth, NoAuth};

/// Authentication configuration enum
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Fixed API key
    ApiKey {
        key: String,
    },
    /// API key read from an environment variable at request time
    Env {
        var: String,
    },
    /// No authentication
    #[default]
    None,
}

impl AuthConfig {
    pub(crate) fn authenticator(&self) -> Arc<dyn Authenticator> {
        match self {
            AuthConfig::ApiKey { key } => Arc::new(ApiKeyAuth::new(key.clone())),
            AuthConfig::Env { var } => Arc::new(EnvKeyAuth::new(var.clone())),
            AuthConfig::None => Arc::new(NoAuth),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider ID
    pub provider_id: String,
    /// Base URL for the API
    pub base_url: String,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Default model to use
    pub model: String,
    /// Request timeout in seconds
    #[serde(with = "serde_duration", default = "default_timeout")]
    pub timeout: Duration,
    /// Additional headers to include
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Create a new provider config
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.auth = AuthConfig::ApiKey { key: key.into() };
        self
    }

    /// Read the API key from an environment variable on each request
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.auth = AuthConfig::Env { var: var.into() };
        self
    }

    /// Set model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set multiple headers
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_id: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            auth: AuthConfig::None,
            model: "gpt-4o-mini".to_string(),
            timeout: default_timeout(),
            headers: HashMap::new(),
            temperature: None,
            max_tokens: None,
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

// Custom serialization for Duration
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ProviderConfig::new("openai", "http://localhost:8000/v1")
            .with_api_key_env("MY_KEY")
            .with_model("llama")
            .with_timeout(Duration::from_secs(5))
            .with_header("x-team", "chat");

        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.auth, AuthConfig::Env { var: "MY_KEY".to_string() });
        assert_eq!(config.model, "llama");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.headers.get("x-team").map(String::as_str), Some("chat"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"provider_id": "openai", "base_url": "http://x/v1", "model": "m", "auth": {"type": "api_key", "key": "k"}}"#,
        )
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.auth, AuthConfig::ApiKey { key: "k".to_string() });
        assert!(config.headers.is_empty());
    }
}
