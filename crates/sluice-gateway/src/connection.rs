//! Per-connection management
//!
//! A [`ConnectionManager`] owns one upgraded socket. It decodes inbound
//! frames, answers pings inline, starts a [`RequestSession`] per
//! `chat_request` and forwards session output to the client through a single
//! queue so frames of one request are never reordered.

use chrono::Utc;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use sluice_core::types::Message;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::backend::ChatBackend;
use crate::protocol::{decode, encode, ClientFrame, ErrorCode, ServerFrame};
use crate::session::{parse_history, RequestSession, SessionState};

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Connection-level transport errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

struct LiveSession {
    seq: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveSession {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Sent by a session task once it reaches a terminal state
#[derive(Debug)]
struct SessionExit {
    request_id: String,
    seq: u64,
    state: SessionState,
}

/// Serves one client connection
pub struct ConnectionManager {
    id: String,
    state: ConnectionState,
    backend: Arc<ChatBackend>,
    heartbeat_interval: Duration,
    /// Parent of every session token on this connection
    shutdown: CancellationToken,
    sessions: HashMap<String, LiveSession>,
    /// Cancelled requests whose terminal frame has not been sent yet
    cancelled: HashSet<String>,
    next_seq: u64,
    outbound_tx: mpsc::UnboundedSender<ServerFrame>,
    outbound_rx: mpsc::UnboundedReceiver<ServerFrame>,
    exit_tx: mpsc::UnboundedSender<SessionExit>,
    exit_rx: mpsc::UnboundedReceiver<SessionExit>,
}

impl ConnectionManager {
    /// `shutdown` closes the connection when cancelled; it is normally a child
    /// of the gateway's token.
    pub fn new(
        id: impl Into<String>,
        backend: Arc<ChatBackend>,
        heartbeat_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            id: id.into(),
            state: ConnectionState::Open,
            backend,
            heartbeat_interval,
            shutdown,
            sessions: HashMap::new(),
            cancelled: HashSet::new(),
            next_seq: 0,
            outbound_tx,
            outbound_rx,
            exit_tx,
            exit_rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Serve the socket until the client leaves, the transport fails or the
    /// gateway shuts down. Every session still running is cancelled on exit.
    pub async fn run<S>(mut self, ws: WebSocketStream<S>) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut inbound) = ws.split();

        let result = self.serve(&mut sink, &mut inbound).await;
        if let Err(e) = &result {
            error!("Connection {} failed: {}", self.id, e);
        }

        self.close(&mut sink).await;
        result
    }

    async fn serve<W, R>(&mut self, sink: &mut W, inbound: &mut R) -> Result<(), ConnectionError>
    where
        W: Sink<WsMessage, Error = WsError> + Unpin,
        R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
    {
        send_frame(
            sink,
            &ServerFrame::ConnectionEstablished {
                message: "Connected to chat gateway".to_string(),
                connection_id: self.id.clone(),
                timestamp: Utc::now(),
            },
        )
        .await?;

        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Closing connection {} for shutdown", self.id);
                    return Ok(());
                }

                message = inbound.next() => match message {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch(&text, sink).await?,
                    Some(Ok(WsMessage::Binary(_))) => {
                        warn!("Binary frame on connection {}", self.id);
                        let frame = ServerFrame::error(
                            ErrorCode::InvalidMessage,
                            "Invalid message format: binary frames are not supported",
                            None,
                        );
                        send_frame(sink, &frame).await?;
                    }
                    Some(Ok(WsMessage::Ping(data))) => sink.send(WsMessage::Pong(data)).await?,
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("Client closed connection {}", self.id);
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },

                _ = heartbeat.tick() => {
                    send_frame(sink, &ServerFrame::Heartbeat { timestamp: Utc::now() }).await?;
                }

                Some(exit) = self.exit_rx.recv() => self.reap(exit),

                Some(frame) = self.outbound_rx.recv() => {
                    if self.should_forward(&frame) {
                        send_frame(sink, &frame).await?;
                    }
                }
            }
        }
    }

    async fn dispatch<W>(&mut self, text: &str, sink: &mut W) -> Result<(), ConnectionError>
    where
        W: Sink<WsMessage, Error = WsError> + Unpin,
    {
        let frame = match decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Invalid message on connection {}: {}", self.id, e);
                let reply = ServerFrame::error(
                    ErrorCode::InvalidMessage,
                    format!("Invalid message format: {}", e),
                    None,
                );
                return send_frame(sink, &reply).await;
            }
        };

        debug!(kind = frame.kind(), "Received frame");

        match frame {
            ClientFrame::Ping { request_id } => {
                let pong = ServerFrame::Pong {
                    timestamp: Utc::now(),
                    request_id,
                };
                send_frame(sink, &pong).await
            }
            ClientFrame::ChatRequest {
                request_id,
                messages,
            } => {
                let Some(request_id) = request_id else {
                    let reply = ServerFrame::error(
                        ErrorCode::InvalidRequest,
                        "Invalid request: requestId is required",
                        None,
                    );
                    return send_frame(sink, &reply).await;
                };

                let history = match parse_history(messages.as_ref()) {
                    Ok(history) => history,
                    Err(reason) => {
                        warn!(%request_id, "Rejecting chat request: {}", reason);
                        let reply = ServerFrame::error(
                            ErrorCode::InvalidRequest,
                            format!("Invalid request: {}", reason),
                            Some(request_id),
                        );
                        return send_frame(sink, &reply).await;
                    }
                };

                self.drain_exits();
                if self.sessions.get(&request_id).is_some_and(LiveSession::is_running) {
                    warn!(%request_id, "Duplicate request id");
                    let reply = ServerFrame::error(
                        ErrorCode::DuplicateRequest,
                        format!("Request {} is already in progress", request_id),
                        Some(request_id),
                    );
                    return send_frame(sink, &reply).await;
                }

                self.start_session(request_id, history);
                Ok(())
            }
            ClientFrame::CancelRequest { request_id } => {
                self.cancel_session(request_id.as_deref());
                Ok(())
            }
            ClientFrame::Unknown { kind } => {
                let reply = ServerFrame::error(
                    ErrorCode::UnknownType,
                    format!("Unknown message type: {}", kind),
                    None,
                );
                send_frame(sink, &reply).await
            }
        }
    }

    fn start_session(&mut self, request_id: String, history: Vec<Message>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let cancel = self.shutdown.child_token();
        let session = RequestSession::new(request_id.clone(), cancel.clone(), self.outbound_tx.clone());
        let backend = self.backend.clone();
        let exits = self.exit_tx.clone();
        let span = tracing::debug_span!("request", request_id = %request_id);

        debug!(%request_id, messages = history.len(), "Starting request");
        let exit_id = request_id.clone();
        let task = tokio::spawn(
            async move {
                let state = session.run(backend, history).await;
                debug!(?state, "Request finished");
                let _ = exits.send(SessionExit {
                    request_id: exit_id,
                    seq,
                    state,
                });
            }
            .instrument(span),
        );

        self.sessions
            .insert(request_id, LiveSession { seq, cancel, task });
    }

    /// Cancelling an unknown or finished request is a silent no-op
    fn cancel_session(&mut self, request_id: Option<&str>) {
        match request_id.and_then(|id| self.sessions.get(id)) {
            Some(live) => {
                debug!(request_id = ?request_id, "Cancelling request");
                live.cancel.cancel();
                if let (true, Some(id)) = (live.is_running(), request_id) {
                    self.cancelled.insert(id.to_string());
                }
            }
            None => debug!(request_id = ?request_id, "Cancel for unknown request ignored"),
        }
    }

    /// Chunks a session queued before its cancel was processed are dropped.
    /// Session frames share one FIFO queue, so the terminal frame of a
    /// cancelled request always follows its stale chunks.
    fn should_forward(&mut self, frame: &ServerFrame) -> bool {
        match frame {
            ServerFrame::StreamChunk { request_id, .. } => !self.cancelled.contains(request_id),
            ServerFrame::StreamComplete { request_id, .. }
            | ServerFrame::RequestCancelled { request_id }
            | ServerFrame::Error {
                request_id: Some(request_id),
                ..
            } => {
                self.cancelled.remove(request_id);
                true
            }
            _ => true,
        }
    }

    fn drain_exits(&mut self) {
        while let Ok(exit) = self.exit_rx.try_recv() {
            self.reap(exit);
        }
    }

    fn reap(&mut self, exit: SessionExit) {
        // A newer session may have reused the id after this one finished
        if self
            .sessions
            .get(&exit.request_id)
            .is_some_and(|live| live.seq == exit.seq)
        {
            self.sessions.remove(&exit.request_id);
        }
        debug!(request_id = %exit.request_id, state = ?exit.state, "Request reaped");
    }

    async fn close<W>(&mut self, sink: &mut W)
    where
        W: Sink<WsMessage, Error = WsError> + Unpin,
    {
        self.state = ConnectionState::Closing;
        self.shutdown.cancel();
        let active = self.sessions.values().filter(|s| s.is_running()).count();
        if active > 0 {
            debug!("Cancelled {} active requests on connection {}", active, self.id);
        }
        self.sessions.clear();
        self.cancelled.clear();

        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
        self.state = ConnectionState::Closed;
    }
}

async fn send_frame<W>(sink: &mut W, frame: &ServerFrame) -> Result<(), ConnectionError>
where
    W: Sink<WsMessage, Error = WsError> + Unpin,
{
    match encode(frame) {
        Ok(json) => sink.send(WsMessage::Text(json)).await.map_err(Into::into),
        Err(e) => {
            error!("Failed to serialize frame: {}", e);
            Ok(())
        }
    }
}
