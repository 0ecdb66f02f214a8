//! WebSocket protocol definitions
//!
//! Every text message on the socket is one JSON object with a `type` field.
//! Inbound frames are decoded leniently: unknown kinds become
//! [`ClientFrame::Unknown`] so the connection can report them instead of
//! dropping the client, and per-kind fields are only checked where they are
//! used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sluice_core::chat::FinishReason;

/// Field carrying the caller's correlation id
pub const REQUEST_ID_FIELD: &str = "requestId";

/// Messages sent from client to gateway
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Start generating a reply for `messages`
    ChatRequest {
        request_id: Option<String>,
        /// Raw `messages` field, validated when the request is dispatched
        messages: Option<Value>,
    },
    /// Liveness check
    Ping { request_id: Option<String> },
    /// Stop an in-flight request
    CancelRequest { request_id: Option<String> },
    /// Well-formed frame with a `type` this gateway does not handle
    Unknown { kind: String },
}

impl ClientFrame {
    /// Wire name of this frame's kind
    pub fn kind(&self) -> &str {
        match self {
            ClientFrame::ChatRequest { .. } => "chat_request",
            ClientFrame::Ping { .. } => "ping",
            ClientFrame::CancelRequest { .. } => "cancel_request",
            ClientFrame::Unknown { kind } => kind,
        }
    }
}

/// Events sent from gateway to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once right after the upgrade
    ConnectionEstablished {
        message: String,
        #[serde(rename = "connectionId")]
        connection_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Request accepted, generation beginning
    StreamStart {
        message: String,
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// One generated fragment
    StreamChunk {
        content: String,
        finish_reason: Option<FinishReason>,
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// Normal end, carrying the full text
    StreamComplete {
        content: String,
        finish_reason: FinishReason,
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// Cancellation acknowledged
    RequestCancelled {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// Error response
    Error {
        error: String,
        code: ErrorCode,
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// Reply to a client ping
    Pong {
        timestamp: DateTime<Utc>,
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// Periodic server liveness signal
    Heartbeat { timestamp: DateTime<Utc> },
}

impl ServerFrame {
    pub fn error(code: ErrorCode, error: impl Into<String>, request_id: Option<String>) -> Self {
        ServerFrame::Error {
            error: error.into(),
            code,
            request_id,
        }
    }

    /// Correlation id, if this frame belongs to a request
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ServerFrame::StreamStart { request_id, .. }
            | ServerFrame::StreamChunk { request_id, .. }
            | ServerFrame::StreamComplete { request_id, .. }
            | ServerFrame::RequestCancelled { request_id } => Some(request_id),
            ServerFrame::Error { request_id, .. } | ServerFrame::Pong { request_id, .. } => {
                request_id.as_deref()
            }
            ServerFrame::ConnectionEstablished { .. } | ServerFrame::Heartbeat { .. } => None,
        }
    }
}

/// Machine-readable error category carried in `error` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Payload was not a JSON object
    InvalidMessage,
    /// `type` not recognised
    UnknownType,
    /// Missing request id or bad history
    InvalidRequest,
    /// Request id already in flight on this connection
    DuplicateRequest,
    /// Backend credential not configured
    ConfigError,
    /// Backend failed while generating
    BackendError,
    /// Backend went silent for longer than the idle timeout
    Timeout,
    /// Gateway refused the connection
    CapacityExceeded,
}

/// Frame decoding errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

/// Decode one inbound text message
pub fn decode(text: &str) -> Result<ClientFrame, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::MalformedInput(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(DecodeError::MalformedInput(
            "expected a JSON object".to_string(),
        ));
    };

    let request_id = fields.get(REQUEST_ID_FIELD).and_then(request_id_of);

    let frame = match fields.get("type") {
        Some(Value::String(kind)) => match kind.as_str() {
            "chat_request" => ClientFrame::ChatRequest {
                request_id,
                messages: fields.remove("messages"),
            },
            "ping" => ClientFrame::Ping { request_id },
            "cancel_request" => ClientFrame::CancelRequest { request_id },
            other => ClientFrame::Unknown {
                kind: other.to_string(),
            },
        },
        Some(other) => ClientFrame::Unknown {
            kind: other.to_string(),
        },
        None => ClientFrame::Unknown {
            kind: "null".to_string(),
        },
    };

    Ok(frame)
}

/// Encode one outbound frame
pub fn encode(frame: &ServerFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Request ids are normally strings; numeric ids are accepted and kept in their decimal form.
fn request_id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_chat_request() {
        let frame = decode(
            r#"{"type":"chat_request","requestId":"r1","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ClientFrame::ChatRequest {
                request_id: Some("r1".to_string()),
                messages: Some(json!([{"role": "user", "content": "hi"}])),
            }
        );
        assert_eq!(frame.kind(), "chat_request");
    }

    #[test]
    fn test_decode_keeps_missing_fields_for_later_checks() {
        let frame = decode(r#"{"type":"chat_request"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::ChatRequest {
                request_id: None,
                messages: None
            }
        );
    }

    #[test]
    fn test_decode_numeric_request_id() {
        let frame = decode(r#"{"type":"ping","requestId":42}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping { request_id: Some("42".to_string()) });
    }

    #[test]
    fn test_decode_unknown_kind() {
        assert_eq!(
            decode(r#"{"type":"subscribe","topic":"x"}"#).unwrap(),
            ClientFrame::Unknown { kind: "subscribe".to_string() }
        );
        assert_eq!(
            decode(r#"{"requestId":"r1"}"#).unwrap(),
            ClientFrame::Unknown { kind: "null".to_string() }
        );
        assert_eq!(
            decode(r#"{"type":7}"#).unwrap(),
            ClientFrame::Unknown { kind: "7".to_string() }
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("{not json"), Err(DecodeError::MalformedInput(_))));
        assert!(matches!(decode("[1,2]"), Err(DecodeError::MalformedInput(_))));
        assert!(matches!(decode(""), Err(DecodeError::MalformedInput(_))));
    }

    #[test]
    fn test_encode_stream_chunk_has_null_finish_reason() {
        let frame = ServerFrame::StreamChunk {
            content: "Hel".to_string(),
            finish_reason: None,
            request_id: "r1".to_string(),
        };
        let value: Value = serde_json::from_str(&encode(&frame).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "stream_chunk", "content": "Hel", "finish_reason": null, "requestId": "r1"})
        );
    }

    #[test]
    fn test_encode_stream_complete() {
        let frame = ServerFrame::StreamComplete {
            content: "Hello".to_string(),
            finish_reason: FinishReason::Stop,
            request_id: "r1".to_string(),
        };
        let value: Value = serde_json::from_str(&encode(&frame).unwrap()).unwrap();
        assert_eq!(value["type"], "stream_complete");
        assert_eq!(value["finish_reason"], "stop");
        assert_eq!(value["requestId"], "r1");
    }

    #[test]
    fn test_encode_connection_level_error_omits_request_id() {
        let frame = ServerFrame::error(ErrorCode::InvalidMessage, "Invalid message format", None);
        let value: Value = serde_json::from_str(&encode(&frame).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "error": "Invalid message format", "code": "INVALID_MESSAGE"})
        );
        assert_eq!(frame.request_id(), None);
    }

    #[test]
    fn test_server_frames_decode_back() {
        let frame = ServerFrame::Pong {
            timestamp: Utc::now(),
            request_id: Some("p1".to_string()),
        };
        let parsed: ServerFrame = serde_json::from_str(&encode(&frame).unwrap()).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.request_id(), Some("p1"));

        let heartbeat: ServerFrame =
            serde_json::from_str(r#"{"type":"heartbeat","timestamp":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(heartbeat, ServerFrame::Heartbeat { .. }));
    }
}
