//! Cancellable fragment stream over an [`LLMProvider`].
//!
//! [`BackendStream::start`] spawns a producer task that drives the provider's
//! chunk stream and pushes text fragments into a bounded channel. The returned
//! [`StreamHandle`] is the consumer side. Both sides watch the same
//! [`CancellationToken`]; once it fires the consumer yields nothing further,
//! even if the producer had already queued fragments.

use futures::StreamExt;
use sluice_core::chat::{ChatChunk, ChatRequest, FinishReason};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::LLMProvider;

const FRAGMENT_BUFFER: usize = 32;

/// One step of a backend stream as seen by the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of generated text
    Fragment(String),
    /// Normal end of stream
    Finished(FinishReason),
    /// Abnormal termination
    Failed(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

/// Entry point for starting backend streams
pub struct BackendStream;

impl BackendStream {
    /// Start generating for `request`. Must be called from within a Tokio runtime.
    ///
    /// `cancel` is usually a child of a longer-lived token so that cancelling
    /// the parent tears down every stream started under it.
    pub fn start(
        provider: Arc<dyn LLMProvider>,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> StreamHandle {
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let task = tokio::spawn(pump(provider, request, tx, cancel.clone()));
        StreamHandle {
            events: rx,
            cancel,
            task,
            done: false,
        }
    }
}

/// Consumer side of a running backend stream. Dropping it cancels the producer.
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    done: bool,
}

impl StreamHandle {
    /// Wait for the next event. Returns `None` once a terminal event has been
    /// delivered or the stream was cancelled.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.done || self.cancel.is_cancelled() {
            self.done = true;
            return None;
        }

        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => Some(
                event.unwrap_or_else(|| StreamEvent::Failed("backend stream ended unexpectedly".to_string())),
            ),
        };

        match &event {
            None => self.done = true,
            Some(e) if e.is_terminal() => self.done = true,
            Some(_) => {}
        }
        event
    }

    /// Request early termination. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[cfg(test)]
    fn is_producer_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn pump(
    provider: Arc<dyn LLMProvider>,
    request: ChatRequest,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = provider.chat_stream(request) => result,
    };

    let mut chunks = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(provider = provider.provider_id(), "Backend request failed: {}", e);
            let _ = tx.send(StreamEvent::Failed(e.to_string())).await;
            return;
        }
    };

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Backend stream cancelled");
                return;
            }
            item = chunks.next() => item,
        };

        let event = match item {
            Some(Ok(ChatChunk::Content { text })) => {
                if text.is_empty() {
                    continue;
                }
                StreamEvent::Fragment(text)
            }
            Some(Ok(ChatChunk::Finish { reason })) => StreamEvent::Finished(reason),
            Some(Ok(ChatChunk::Error { message })) => StreamEvent::Failed(message),
            Some(Err(e)) => StreamEvent::Failed(e.to_string()),
            None => StreamEvent::Finished(FinishReason::Stop),
        };

        let terminal = event.is_terminal();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = tx.send(event) => sent.is_ok(),
        };
        if !sent || terminal {
            return;
        }
    }
}
