//! Provider plus the per-request settings every session on the gateway shares.

use sluice_core::chat::ChatRequest;
use sluice_core::types::Message;
use sluice_llm::LLMProvider;
use std::sync::Arc;
use std::time::Duration;

/// The language-model backend sessions stream from
#[derive(Clone)]
pub struct ChatBackend {
    provider: Arc<dyn LLMProvider>,
    system_prompt: Option<String>,
    idle_timeout: Option<Duration>,
}

impl std::fmt::Debug for ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("provider", &self.provider.provider_id())
            .field("system_prompt", &self.system_prompt.is_some())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl ChatBackend {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            system_prompt: None,
            idle_timeout: None,
        }
    }

    /// Prepend a system message to every conversation
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    /// Fail a request when the backend produces nothing for this long
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Whether the provider can authenticate; checked before any backend call
    pub fn is_configured(&self) -> bool {
        self.provider.has_credentials()
    }

    /// Build the provider request for a client history. The model is left to
    /// the provider's configured default.
    pub fn build_request(&self, history: Vec<Message>) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(history);
        ChatRequest::default().with_messages(messages).stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_llm::MockProvider;

    #[test]
    fn test_build_request_prepends_system_prompt() {
        let backend = ChatBackend::new(Arc::new(MockProvider::new(vec![])))
            .with_system_prompt(Some("Be brief.".to_string()));
        let request = backend.build_request(vec![Message::user("hi")]);

        assert_eq!(
            request.messages,
            vec![Message::system("Be brief."), Message::user("hi")]
        );
        assert!(request.options.stream);
        assert!(request.model.is_empty());
    }

    #[test]
    fn test_blank_system_prompt_is_ignored() {
        let backend = ChatBackend::new(Arc::new(MockProvider::new(vec![])))
            .with_system_prompt(Some("  ".to_string()));
        let request = backend.build_request(vec![Message::user("hi")]);
        assert_eq!(request.messages, vec![Message::user("hi")]);
    }

    #[test]
    fn test_is_configured_follows_provider() {
        let backend = ChatBackend::new(Arc::new(MockProvider::new(vec![]).without_credentials()));
        assert!(!backend.is_configured());
    }
}
