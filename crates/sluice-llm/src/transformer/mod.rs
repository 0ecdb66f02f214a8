pub mod openai;

pub use openai::OpenAiTransformer;

use futures::Stream;
use serde_json::Value;
use sluice_core::chat::{ChatChunk, ChatRequest};
use std::pin::Pin;

use crate::error::ConversionError;

/// Type alias for LLM stream
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, crate::LLMError>> + Send>>;

/// Converts between internal chat types and a provider's wire schema
pub trait SchemaTransformer: Send + Sync {
    /// Get the provider ID
    fn provider_id(&self) -> &str;

    /// Transform request to provider-specific format
    fn transform_request(&self, request: &ChatRequest) -> Result<Value, ConversionError>;

    /// Parse one SSE `data:` payload. `Ok(None)` means the payload carried nothing of interest.
    fn parse_stream_chunk(&self, data: &str) -> Result<Option<ChatChunk>, ConversionError>;
}
