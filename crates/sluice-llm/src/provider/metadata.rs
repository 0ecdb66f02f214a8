use async_trait::async_trait;
use sluice_core::chat::ChatRequest;

use crate::error::Result;
use crate::transformer::LLMStream;

/// LLM Provider trait
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider ID
    fn provider_id(&self) -> &str;

    /// Get provider metadata
    fn metadata(&self) -> &ProviderMetadata;

    /// Model used when the caller does not name one
    fn default_model(&self) -> &str;

    /// Whether a credential is available. Checked before every request.
    fn has_credentials(&self) -> bool;

    /// Send a chat request and stream the response
    async fn chat_stream(&self, request: ChatRequest) -> Result<LLMStream>;

    /// Validate the provider configuration
    async fn validate(&self) -> Result<()>;
}

/// Provider metadata
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Provider ID
    pub id: String,
    /// Human-readable name
    pub name: String,
}

impl ProviderMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
