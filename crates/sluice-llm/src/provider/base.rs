use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{header, Client};
use sluice_core::chat::ChatRequest;
use std::sync::Arc;
use tracing::debug;

use crate::auth::Authenticator;
use crate::error::{LLMError, Result};
use crate::provider::{LLMProvider, ProviderConfig, ProviderMetadata};
use crate::transformer::{LLMStream, SchemaTransformer};

/// Base provider implementation
/// Handles common HTTP functionality and delegates schema transformation
pub struct BaseProvider<T: SchemaTransformer> {
    config: ProviderConfig,
    http_client: Client,
    transformer: Arc<T>,
    pub metadata: ProviderMetadata,
    authenticator: Arc<dyn Authenticator>,
}

impl<T: SchemaTransformer + 'static> BaseProvider<T> {
    /// Create a new base provider
    pub fn new(config: ProviderConfig, transformer: T, metadata: ProviderMetadata) -> Result<Self> {
        let authenticator = config.auth.authenticator();
        Self::with_authenticator(config, transformer, metadata, authenticator)
    }

    /// Create with a custom authenticator
    pub fn with_authenticator(
        config: ProviderConfig,
        transformer: T,
        metadata: ProviderMetadata,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        // The timeout bounds connection setup only; a streaming body may legitimately run longer.
        let http_client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| LLMError::Config(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            transformer: Arc::new(transformer),
            metadata,
            authenticator,
        })
    }

    /// Get the provider ID
    pub fn provider_id(&self) -> &str {
        self.transformer.provider_id()
    }

    /// Get the config
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Get the authenticator
    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    /// Build request headers
    fn build_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("text/event-stream"),
        );

        if let Some((header_name, header_value)) = self.authenticator.get_auth_header()? {
            let name = header::HeaderName::from_bytes(header_name.as_bytes())
                .map_err(|e| LLMError::Config(format!("Invalid auth header name: {}", e)))?;
            let value = header::HeaderValue::from_str(&header_value)
                .map_err(|e| LLMError::Config(format!("Invalid auth header value: {}", e)))?;
            headers.insert(name, value);
        }

        for (key, value) in &self.config.headers {
            let header_name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| LLMError::Config(format!("Invalid header name: {}", e)))?;
            let header_value = header::HeaderValue::from_str(value)
                .map_err(|e| LLMError::Config(format!("Invalid header value: {}", e)))?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }

    /// Fill in configured defaults the caller left unset
    fn prepare(&self, mut request: ChatRequest) -> ChatRequest {
        if request.model.is_empty() {
            request.model = self.config.model.clone();
        }
        if request.options.temperature.is_none() {
            request.options.temperature = self.config.temperature;
        }
        if request.options.max_tokens.is_none() {
            request.options.max_tokens = self.config.max_tokens;
        }
        request.options.stream = true;
        request
    }

    /// Send a streaming request
    pub async fn send_stream_request(&self, request: ChatRequest) -> Result<LLMStream> {
        let headers = self.build_headers()?;
        let request = self.prepare(request);
        let body = self.transformer.transform_request(&request)?;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!(%url, model = %request.model, messages = request.messages.len(), "Sending stream request");

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LLMError::Auth(error_text),
                code => LLMError::Api {
                    status: code,
                    message: error_text,
                },
            });
        }

        let transformer = self.transformer.clone();
        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(move |event| {
                let transformer = transformer.clone();
                async move {
                    match event {
                        Ok(event) => match transformer.parse_stream_chunk(event.data.trim()) {
                            Ok(Some(chunk)) => Some(Ok(chunk)),
                            Ok(None) => None,
                            Err(e) => Some(Err(LLMError::Transform(e))),
                        },
                        Err(e) => Some(Err(LLMError::Stream(e.to_string()))),
                    }
                }
            });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl<T: SchemaTransformer + 'static> LLMProvider for BaseProvider<T> {
    fn provider_id(&self) -> &str {
        self.provider_id()
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    fn has_credentials(&self) -> bool {
        self.authenticator.is_configured()
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<LLMStream> {
        self.send_stream_request(request).await
    }

    async fn validate(&self) -> Result<()> {
        // Building headers exercises the authenticator and custom header values
        let _ = self.build_headers()?;
        reqwest::Url::parse(&self.config.base_url)
            .map_err(|e| LLMError::Config(format!("Invalid base_url: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::OpenAiTransformer;

    fn provider(config: ProviderConfig) -> BaseProvider<OpenAiTransformer> {
        BaseProvider::new(
            config,
            OpenAiTransformer::new(),
            ProviderMetadata::new("openai", "OpenAI"),
        )
        .unwrap()
    }

    #[test]
    fn test_prepare_fills_defaults() {
        let p = provider(
            ProviderConfig::new("openai", "http://localhost/v1")
                .with_model("m1")
                .with_temperature(Some(0.3)),
        );
        let request = p.prepare(ChatRequest::default());
        assert_eq!(request.model, "m1");
        assert_eq!(request.options.temperature, Some(0.3));
        assert!(request.options.stream);
    }

    #[test]
    fn test_build_headers_includes_custom_headers() {
        let p = provider(
            ProviderConfig::new("openai", "http://localhost/v1")
                .with_api_key("sk-1")
                .with_header("x-org", "acme"),
        );
        let headers = p.build_headers().unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-1");
        assert_eq!(headers.get("x-org").unwrap(), "acme");
    }

    #[tokio::test]
    async fn test_validate_reports_missing_credential() {
        let p = provider(
            ProviderConfig::new("openai", "http://localhost/v1")
                .with_api_key_env("SLUICE_TEST_BASE_PROVIDER_UNSET"),
        );
        assert!(!p.has_credentials());
        assert!(matches!(p.validate().await, Err(LLMError::MissingCredential(_))));
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_base_url() {
        let p = provider(ProviderConfig::new("openai", "not a url").with_api_key("sk"));
        assert!(matches!(p.validate().await, Err(LLMError::Config(_))));
    }
}
