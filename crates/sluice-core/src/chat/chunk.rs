/// Chat stream chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ChatChunk {
    /// Text content delta
    Content { text: String },
    /// Stream finished
    Finish { reason: FinishReason },
    /// Error reported inside the stream
    Error { message: String },
}

impl ChatChunk {
    /// Create a content chunk
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Create an error chunk
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Create a finish chunk
    pub fn finish(reason: FinishReason) -> Self {
        Self::Finish { reason }
    }

    /// Check if this is an error chunk
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Check if this is a finish chunk
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }
}

/// Reason for finishing the generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Completed naturally
    Stop,
    /// Hit token limit
    Length,
    /// Content was filtered
    ContentFilter,
}

impl FinishReason {
    /// Convert from a provider string; unrecognised values map to `Stop`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::Stop,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_parse() {
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::parse("length"), FinishReason::Length);
        assert_eq!(FinishReason::parse("content_filter"), FinishReason::ContentFilter);
        assert_eq!(FinishReason::parse("tool_calls"), FinishReason::Stop);
    }

    #[test]
    fn test_finish_reason_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&FinishReason::Stop).unwrap(), "\"stop\"");
        assert_eq!(
            serde_json::to_string(&FinishReason::ContentFilter).unwrap(),
            "\"content_filter\""
        );
    }

    #[test]
    fn test_chat_chunk_helpers() {
        let chunk = ChatChunk::content("Hello");
        match chunk {
            ChatChunk::Content { text } => assert_eq!(text, "Hello"),
            _ => panic!("Expected content chunk"),
        }
        assert!(ChatChunk::error("boom").is_error());
        assert!(ChatChunk::finish(FinishReason::Stop).is_finish());
    }
}
