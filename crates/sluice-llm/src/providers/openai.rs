use async_trait::async_trait;
use sluice_core::chat::ChatRequest;

use crate::error::Result;
use crate::provider::{BaseProvider, LLMProvider, ProviderConfig, ProviderMetadata};
use crate::transformer::{LLMStream, OpenAiTransformer};

/// OpenAI Provider
/// Uses the OpenAI API or any compatible `/chat/completions` endpoint
pub struct OpenAiProvider {
    base: BaseProvider<OpenAiTransformer>,
}

impl OpenAiProvider {
    /// Create with custom configuration
    pub fn with_config(config: ProviderConfig) -> Result<Self> {
        let metadata = ProviderMetadata::new(config.provider_id.clone(), "OpenAI");
        let base = BaseProvider::new(config, OpenAiTransformer::new(), metadata)?;
        Ok(Self { base })
    }

    /// Create a new OpenAI provider with API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let config = ProviderConfig::new("openai", "https://api.openai.com/v1").with_api_key(api_key);
        Self::with_config(config)
    }

    /// Create with custom base URL (for Azure or other compatible APIs)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let config = ProviderConfig::new("openai", base_url).with_api_key(api_key);
        Self::with_config(config)
    }

    pub fn config(&self) -> &ProviderConfig {
        self.base.config()
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        self.base.provider_id()
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.base.metadata
    }

    fn default_model(&self) -> &str {
        self.base.default_model()
    }

    fn has_credentials(&self) -> bool {
        self.base.has_credentials()
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<LLMStream> {
        self.base.chat_stream(request).await
    }

    async fn validate(&self) -> Result<()> {
        self.base.validate().await
    }
}
