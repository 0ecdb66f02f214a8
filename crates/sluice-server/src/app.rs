//! Turns file configuration into a running gateway's parts.

use sluice_config::{Config, LlmConfig};
use sluice_gateway::{ChatBackend, GatewayConfig};
use sluice_llm::{LLMProvider, MockProvider, OpenAiProvider, ProviderConfig};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::BackendKind;

const MOCK_REPLY: &str = "This is a scripted reply from the sluice mock backend.";

pub fn gateway_config(config: &sluice_config::GatewayConfig) -> GatewayConfig {
    GatewayConfig {
        bind: config.bind.clone(),
        path: config.path.clone(),
        max_connections: config.max_connections,
        heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
    }
}

pub fn provider_config(llm: &LlmConfig) -> ProviderConfig {
    let config = ProviderConfig::new("openai", &llm.base_url)
        .with_api_key_env(&llm.api_key_env)
        .with_model(&llm.model)
        .with_timeout(Duration::from_secs(llm.timeout_seconds))
        .with_temperature(llm.temperature)
        .with_max_tokens(llm.max_tokens);

    match &llm.headers {
        Some(headers) => config.with_headers(headers.clone()),
        None => config,
    }
}

pub fn build_backend(config: &Config, kind: BackendKind) -> anyhow::Result<ChatBackend> {
    let provider: Arc<dyn LLMProvider> = match kind {
        BackendKind::Openai => Arc::new(OpenAiProvider::with_config(provider_config(&config.llm))?),
        BackendKind::Mock => {
            Arc::new(MockProvider::with_text_response(MOCK_REPLY).with_delay(Duration::from_millis(50)))
        }
    };

    Ok(ChatBackend::new(provider)
        .with_system_prompt(config.llm.system_prompt.clone())
        .with_idle_timeout(config.gateway.stream_idle_timeout_secs.map(Duration::from_secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_gateway_config_mapping() {
        let mut config = Config::default();
        config.gateway.bind = "0.0.0.0:1234".to_string();
        config.gateway.path = "/chat".to_string();
        config.gateway.max_connections = 5;
        config.gateway.heartbeat_interval_secs = 7;

        let mapped = gateway_config(&config.gateway);
        assert_eq!(mapped.bind, "0.0.0.0:1234");
        assert_eq!(mapped.path, "/chat");
        assert_eq!(mapped.max_connections, 5);
        assert_eq!(mapped.heartbeat_interval, Duration::from_secs(7));
    }

    #[test]
    fn test_provider_config_mapping() {
        let llm = LlmConfig {
            base_url: "http://localhost:9999/v1".to_string(),
            model: "gpt-test".to_string(),
            temperature: Some(0.2),
            max_tokens: Some(256),
            headers: Some(HashMap::from([("x-team".to_string(), "chat".to_string())])),
            ..LlmConfig::default()
        };

        let provider = provider_config(&llm);
        assert_eq!(provider.base_url, "http://localhost:9999/v1");
        assert_eq!(provider.model, "gpt-test");
        assert_eq!(provider.timeout, Duration::from_secs(60));
        assert_eq!(provider.temperature, Some(0.2));
        assert_eq!(provider.max_tokens, Some(256));
        assert_eq!(provider.headers.get("x-team").map(String::as_str), Some("chat"));
    }

    #[test]
    fn test_mock_backend_needs_no_credential() {
        let backend = tokio_test::assert_ok!(build_backend(&Config::default(), BackendKind::Mock));
        assert!(backend.is_configured());
        assert_eq!(backend.provider().provider_id(), "mock");
    }

    #[test]
    fn test_openai_backend_without_key_still_builds() {
        let mut config = Config::default();
        config.llm.api_key_env = "SLUICE_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        config.gateway.stream_idle_timeout_secs = Some(15);

        let backend = tokio_test::assert_ok!(build_backend(&config, BackendKind::Openai));
        assert!(!backend.is_configured());
        assert_eq!(backend.idle_timeout(), Some(Duration::from_secs(15)));
    }
}
