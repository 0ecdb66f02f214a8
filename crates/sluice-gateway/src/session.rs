//! Request sessions
//!
//! A [`RequestSession`] owns one `chat_request` from acceptance to its
//! terminal frame. It emits, in order, `stream_start`, zero or more
//! `stream_chunk`s and exactly one of `stream_complete`, `request_cancelled`
//! or `error`. Nothing is emitted after the terminal frame.

use serde_json::Value;
use sluice_core::chat::FinishReason;
use sluice_core::types::{Message, Role};
use sluice_llm::{BackendStream, StreamEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::ChatBackend;
use crate::protocol::{ErrorCode, ServerFrame};

/// Lifecycle of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Pending, Streaming | Cancelled | Failed) | (Streaming, Completed | Cancelled | Failed)
        )
    }
}

/// Validate a client-supplied history.
///
/// The history must be an array of `{role, content}` objects where role is
/// `user` or `assistant` and content is a string. System instructions come
/// from gateway configuration only.
pub fn parse_history(messages: Option<&Value>) -> Result<Vec<Message>, String> {
    let items = match messages {
        Some(Value::Array(items)) => items,
        Some(_) => return Err("messages must be an array".to_string()),
        None => return Err("messages is required".to_string()),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let role = item
                .get("role")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("messages[{}].role must be a string", index))?;
            let role = match Role::parse(role) {
                Some(role @ (Role::User | Role::Assistant)) => role,
                _ => return Err(format!("messages[{}].role '{}' is not allowed", index, role)),
            };
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("messages[{}].content must be a string", index))?;
            Ok(Message {
                role,
                content: content.to_string(),
            })
        })
        .collect()
}

/// One in-flight chat request
pub struct RequestSession {
    request_id: String,
    state: SessionState,
    output: String,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<ServerFrame>,
}

impl RequestSession {
    /// `cancel` stops the session; `outbound` is the owning connection's send queue.
    pub fn new(
        request_id: impl Into<String>,
        cancel: CancellationToken,
        outbound: mpsc::UnboundedSender<ServerFrame>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            state: SessionState::Pending,
            output: String::new(),
            cancel,
            outbound,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the request to a terminal state and return it
    pub async fn run(mut self, backend: Arc<ChatBackend>, history: Vec<Message>) -> SessionState {
        if !backend.is_configured() {
            warn!("Rejecting request, backend has no credential");
            self.fail(ErrorCode::ConfigError, "API key not configured");
            return self.state;
        }

        if self.cancel.is_cancelled() {
            self.finish_cancelled();
            return self.state;
        }

        let request = backend.build_request(history);
        let mut stream =
            BackendStream::start(backend.provider().clone(), request, self.cancel.clone());

        self.transition(SessionState::Streaming);
        self.emit(ServerFrame::StreamStart {
            message: "Stream started".to_string(),
            request_id: self.request_id.clone(),
        });

        loop {
            let event = match backend.idle_timeout() {
                Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                    Ok(event) => event,
                    Err(_) => {
                        stream.cancel();
                        warn!(?limit, "Backend stalled");
                        self.fail(
                            ErrorCode::Timeout,
                            format!("Backend produced no output within {:?}", limit),
                        );
                        break;
                    }
                },
                None => stream.next().await,
            };

            match event {
                Some(StreamEvent::Fragment(text)) => {
                    // Cancelled while this fragment was in flight; the next poll reports it
                    if self.cancel.is_cancelled() {
                        continue;
                    }
                    self.output.push_str(&text);
                    self.emit(ServerFrame::StreamChunk {
                        content: text,
                        finish_reason: None,
                        request_id: self.request_id.clone(),
                    });
                }
                Some(StreamEvent::Finished(reason)) => {
                    debug!(%reason, chars = self.output.len(), "Backend stream finished");
                    self.transition(SessionState::Completed);
                    let content = std::mem::take(&mut self.output);
                    self.emit(ServerFrame::StreamComplete {
                        content,
                        finish_reason: FinishReason::Stop,
                        request_id: self.request_id.clone(),
                    });
                    break;
                }
                Some(StreamEvent::Failed(message)) => {
                    warn!(error = %message, "Backend stream failed");
                    self.fail(ErrorCode::BackendError, format!("Backend error: {}", message));
                    break;
                }
                None => {
                    self.finish_cancelled();
                    break;
                }
            }
        }

        self.state
    }

    fn finish_cancelled(&mut self) {
        debug!("Request cancelled");
        self.transition(SessionState::Cancelled);
        self.emit(ServerFrame::RequestCancelled {
            request_id: self.request_id.clone(),
        });
    }

    fn fail(&mut self, code: ErrorCode, error: impl Into<String>) {
        self.transition(SessionState::Failed);
        self.emit(ServerFrame::error(code, error, Some(self.request_id.clone())));
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    fn emit(&self, frame: ServerFrame) {
        // The connection is gone; the parent token will stop us shortly
        let _ = self.outbound.send(frame);
    }
}
