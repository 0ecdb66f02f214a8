use serde_json::{json, Value};
use sluice_core::chat::{ChatChunk, ChatRequest, FinishReason};
use sluice_core::types::Message;

use crate::error::ConversionError;
use crate::transformer::SchemaTransformer;

/// OpenAI-compatible schema transformer
/// Works with OpenAI API, Azure OpenAI, and compatible providers
#[derive(Debug, Default)]
pub struct OpenAiTransformer;

impl OpenAiTransformer {
    pub fn new() -> Self {
        Self
    }

    fn convert_message(&self, msg: &Message) -> Value {
        json!({
            "role": msg.role.as_str(),
            "content": msg.content,
        })
    }
}

impl SchemaTransformer for OpenAiTransformer {
    fn provider_id(&self) -> &str {
        "openai"
    }

    fn transform_request(&self, request: &ChatRequest) -> Result<Value, ConversionError> {
        if request.model.is_empty() {
            return Err(ConversionError::MissingField("model".to_string()));
        }

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| self.convert_message(m))
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": request.options.stream,
        });

        if let Some(temp) = request.options.temperature {
            body["temperature"] = json!(temp);
        }

        if let Some(max_tokens) = request.options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        Ok(body)
    }

    fn parse_stream_chunk(&self, data: &str) -> Result<Option<ChatChunk>, ConversionError> {
        // SSE terminator
        if data == "[DONE]" {
            return Ok(Some(ChatChunk::Finish {
                reason: FinishReason::Stop,
            }));
        }

        let chunk: Value = serde_json::from_str(data)?;

        // Some compatible servers report failures in-band
        if let Some(message) = chunk["error"]["message"].as_str() {
            return Ok(Some(ChatChunk::Error {
                message: message.to_string(),
            }));
        }

        let choice = chunk["choices"].get(0);

        if let Some(content) = choice.and_then(|c| c["delta"]["content"].as_str()) {
            if !content.is_empty() {
                return Ok(Some(ChatChunk::Content {
                    text: content.to_string(),
                }));
            }
        }

        if let Some(reason) = choice.and_then(|c| c["finish_reason"].as_str()) {
            return Ok(Some(ChatChunk::Finish {
                reason: FinishReason::parse(reason),
            }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_request() {
        let transformer = OpenAiTransformer::new();
        let request = ChatRequest::new("gpt-4")
            .with_message(Message::user("Hello"))
            .temperature(0.7)
            .stream();

        let body = transformer.transform_request(&request).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["stream"], true);
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 0.001, "temperature should be approximately 0.7, got {}", temp);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_transform_request_requires_model() {
        let transformer = OpenAiTransformer::new();
        let request = ChatRequest::default().with_message(Message::user("Hello"));
        assert!(matches!(
            transformer.transform_request(&request),
            Err(ConversionError::MissingField(_))
        ));
    }

    #[test]
    fn test_parse_stream_chunk() {
        let transformer = OpenAiTransformer::new();

        let chunk = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        match transformer.parse_stream_chunk(chunk).unwrap() {
            Some(ChatChunk::Content { text }) => assert_eq!(text, "Hello"),
            other => panic!("Expected content chunk, got {:?}", other),
        }

        let finish = r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#;
        match transformer.parse_stream_chunk(finish).unwrap() {
            Some(ChatChunk::Finish { reason }) => assert_eq!(reason, FinishReason::Length),
            other => panic!("Expected finish chunk, got {:?}", other),
        }

        let done = transformer.parse_stream_chunk("[DONE]").unwrap();
        assert_eq!(done, Some(ChatChunk::finish(FinishReason::Stop)));
    }

    #[test]
    fn test_parse_stream_chunk_role_only_delta_is_ignored() {
        let transformer = OpenAiTransformer::new();
        let chunk = r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#;
        assert_eq!(transformer.parse_stream_chunk(chunk).unwrap(), None);
    }

    #[test]
    fn test_parse_stream_chunk_errors() {
        let transformer = OpenAiTransformer::new();
        let in_band = r#"{"error":{"message":"overloaded"}}"#;
        assert_eq!(
            transformer.parse_stream_chunk(in_band).unwrap(),
            Some(ChatChunk::error("overloaded"))
        );
        assert!(matches!(
            transformer.parse_stream_chunk("not json"),
            Err(ConversionError::Json(_))
        ));
    }
}
