//! Scripted provider for tests and offline runs.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use sluice_core::chat::{ChatChunk, ChatRequest, FinishReason};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LLMError, Result};
use crate::provider::{LLMProvider, ProviderMetadata};
use crate::transformer::LLMStream;

/// Mock LLM provider that replays a fixed list of fragments
#[derive(Clone)]
pub struct MockProvider {
    fragments: Vec<String>,
    delay: Duration,
    fail_after: Option<(usize, String)>,
    fail_on_start: Option<String>,
    stall_after: Option<usize>,
    credentials: bool,
    metadata: ProviderMetadata,
    calls: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<ChatRequest>>>,
}

impl MockProvider {
    pub fn new(fragments: Vec<String>) -> Self {
        Self {
            fragments,
            delay: Duration::ZERO,
            fail_after: None,
            fail_on_start: None,
            stall_after: None,
            credentials: true,
            metadata: ProviderMetadata::new("mock", "Mock Provider"),
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Split text into word fragments, keeping the separating spaces
    pub fn with_text_response(text: &str) -> Self {
        let fragments = text
            .split_inclusive(' ')
            .map(|s| s.to_string())
            .collect();
        Self::new(fragments)
    }

    /// Sleep this long before each fragment
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Emit `count` fragments, then report a stream error
    pub fn failing_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((count, message.into()));
        self
    }

    /// Refuse the request before any fragment is produced
    pub fn failing_on_start(mut self, message: impl Into<String>) -> Self {
        self.fail_on_start = Some(message.into());
        self
    }

    /// Emit `count` fragments, then never produce anything again
    pub fn stalling_after(mut self, count: usize) -> Self {
        self.stall_after = Some(count);
        self
    }

    /// Behave as if no API key is configured
    pub fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    /// Number of `chat_stream` calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most recent request received
    pub fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().clone()
    }

    fn script(&self) -> (Vec<Result<ChatChunk>>, bool) {
        let limit = match (&self.fail_after, self.stall_after) {
            (Some((n, _)), _) => *n,
            (None, Some(n)) => n,
            (None, None) => self.fragments.len(),
        };

        let mut items: Vec<Result<ChatChunk>> = self
            .fragments
            .iter()
            .take(limit)
            .map(|f| Ok(ChatChunk::content(f.clone())))
            .collect();

        if let Some((_, message)) = &self.fail_after {
            items.push(Err(LLMError::Stream(message.clone())));
            return (items, false);
        }
        if self.stall_after.is_some() {
            return (items, true);
        }
        items.push(Ok(ChatChunk::finish(FinishReason::Stop)));
        (items, false)
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    fn provider_id(&self) -> &str {
        "mock"
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    fn has_credentials(&self) -> bool {
        self.credentials
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<LLMStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request);

        if !self.credentials {
            return Err(LLMError::MissingCredential("mock has no credentials".to_string()));
        }
        if let Some(message) = &self.fail_on_start {
            return Err(LLMError::Api {
                status: 500,
                message: message.clone(),
            });
        }

        let (items, stall) = self.script();
        let delay = self.delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });

        if stall {
            Ok(Box::pin(stream.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(stream))
        }
    }

    async fn validate(&self) -> Result<()> {
        if self.credentials {
            Ok(())
        } else {
            Err(LLMError::MissingCredential("mock has no credentials".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::types::Message;

    async fn collect(provider: &MockProvider) -> Vec<std::result::Result<ChatChunk, String>> {
        let mut stream = provider
            .chat_stream(ChatRequest::new("mock-model").with_message(Message::user("hi")))
            .await
            .unwrap();
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.map_err(|e| e.to_string()));
        }
        out
    }

    #[tokio::test]
    async fn test_mock_provider_text_response() {
        let mock = MockProvider::with_text_response("I will help you.");
        let chunks = collect(&mock).await;

        let text: String = chunks
            .iter()
            .filter_map(|c| match c {
                Ok(ChatChunk::Content { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "I will help you.");
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.last(), Some(&Ok(ChatChunk::finish(FinishReason::Stop))));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.last_request().unwrap().messages, vec![Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_mock_provider_failing_after() {
        let mock = MockProvider::new(vec!["a".into(), "b".into(), "c".into()])
            .failing_after(1, "boom");
        let chunks = collect(&mock).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Ok(ChatChunk::content("a")));
        assert!(chunks[1].as_ref().unwrap_err().contains("boom"));
    }

    #[tokio::test]
    async fn test_mock_provider_without_credentials() {
        let mock = MockProvider::new(vec![]).without_credentials();
        assert!(!mock.has_credentials());
        assert!(mock.validate().await.is_err());
        assert!(mock.chat_stream(ChatRequest::new("m")).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_empty_response() {
        let mock = MockProvider::new(vec![]);
        let chunks = collect(&mock).await;
        assert_eq!(chunks, vec![Ok(ChatChunk::finish(FinishReason::Stop))]);
    }

    #[test]
    fn test_mock_provider_keeps_only_latest_request() {
        let mock = MockProvider::with_text_response("ok");
        for i in 0..1000 {
            let request =
                ChatRequest::new("mock-model").with_message(Message::user(format!("turn {}", i)));
            tokio_test::assert_ok!(tokio_test::block_on(mock.chat_stream(request)));
        }

        assert_eq!(mock.call_count(), 1000);
        assert_eq!(
            mock.last_request().unwrap().messages,
            vec![Message::user("turn 999")]
        );
    }
}
