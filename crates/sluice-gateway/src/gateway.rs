//! Gateway main structure
//!
//! Accepts TCP connections, performs the WebSocket upgrade and hands each
//! socket to its own [`ConnectionManager`] task.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backend::ChatBackend;
use crate::connection::{ConnectionError, ConnectionManager};
use crate::handshake::validate_upgrade;
use crate::protocol::{encode, ErrorCode, ServerFrame};
use crate::registry::{ConnectionInfo, ConnectionRegistry};

/// How long shutdown waits for open connections to close
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (e.g., "127.0.0.1:18790")
    pub bind: String,
    /// Upgrade path (e.g., "/ws")
    pub path: String,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Interval between heartbeat frames
    pub heartbeat_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:18790".to_string(),
            path: "/ws".to_string(),
            max_connections: 1000,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// The main Gateway server
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    backend: Arc<ChatBackend>,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("connections", &self.registry.len())
            .finish()
    }
}

impl Gateway {
    /// Create a new Gateway instance
    pub fn new(config: GatewayConfig, backend: ChatBackend) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.max_connections));
        Self {
            config: Arc::new(config),
            backend: Arc::new(backend),
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Get the connection registry
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting connections and close the open ones
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token that triggers [`Gateway::shutdown`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        let addr: SocketAddr = self.config.bind.parse()?;
        Ok(TcpListener::bind(&addr).await?)
    }

    /// Run the gateway server
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let addr = listener.local_addr()?;
        info!("Gateway listening on ws://{}{}", addr, self.config.path);

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    debug!("New connection from {}", peer);

                    let gateway = self.clone();
                    connections.spawn(async move {
                        match gateway.handle_connection(stream, peer).await {
                            Ok(()) => {}
                            Err(GatewayError::Handshake(e)) => warn!("Handshake with {} failed: {}", peer, e),
                            // Logged by the connection itself
                            Err(GatewayError::Connection(e)) => debug!("Connection from {} ended: {}", peer, e),
                            Err(e) => error!("Connection error for {}: {}", peer, e),
                        }
                    });
                }
            }
        }

        info!(open = self.registry.len(), "Gateway shutting down");
        for info in self.registry.list() {
            debug!(connection_id = %info.id, peer = %info.peer, "Closing connection for shutdown");
        }
        drop(listener);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Connections still open after {:?}, aborting", SHUTDOWN_GRACE);
            connections.shutdown().await;
        }
        info!("Gateway stopped");
        Ok(())
    }

    /// Handle a WebSocket connection
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), GatewayError> {
        let path = self.config.path.clone();
        let ws_stream = accept_hdr_async(stream, move |request: &Request, response: Response| {
            match validate_upgrade(request, &path) {
                Ok(_) => Ok(response),
                Err(e) => {
                    warn!(%peer, "Rejected upgrade: {}", e);
                    Err(e.to_response())
                }
            }
        })
        .await
        .map_err(GatewayError::Handshake)?;

        let connection_id = Uuid::new_v4().to_string();
        if !self
            .registry
            .try_register(ConnectionInfo::new(connection_id.clone(), peer))
        {
            warn!("Connection limit reached, rejecting {}", peer);
            return reject_connection(ws_stream, "Server at capacity").await;
        }

        let span = info_span!("connection", connection_id = %connection_id, %peer);
        async {
            info!(active = self.registry.len(), "Client connected");

            let manager = ConnectionManager::new(
                connection_id.clone(),
                self.backend.clone(),
                self.config.heartbeat_interval,
                self.shutdown.child_token(),
            );
            let result = manager.run(ws_stream).await;

            let connected_secs = self
                .registry
                .remove(&connection_id)
                .map(|info| (Utc::now() - info.connected_at).num_seconds())
                .unwrap_or_default();
            info!(active = self.registry.len(), connected_secs, "Client disconnected");
            result.map_err(GatewayError::from)
        }
        .instrument(span)
        .await
    }
}

/// Tell a client the gateway is full, then close
async fn reject_connection(
    mut ws_stream: WebSocketStream<TcpStream>,
    reason: &str,
) -> Result<(), GatewayError> {
    let frame = ServerFrame::error(ErrorCode::CapacityExceeded, reason, None);
    ws_stream.send(WsMessage::Text(encode(&frame)?)).await?;
    ws_stream.close(None).await?;

    // Let the client's close reply arrive so the socket shuts down cleanly
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(Ok(_)) = ws_stream.next().await {}
    })
    .await;
    Ok(())
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gateway({}{})", self.config.bind, self.config.path)
    }
}

/// Gateway-related errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_llm::MockProvider;

    fn gateway(config: GatewayConfig) -> Gateway {
        Gateway::new(config, ChatBackend::new(Arc::new(MockProvider::new(vec![]))))
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind, "127.0.0.1:18790");
        assert_eq!(config.path, "/ws");
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        let gw = gateway(GatewayConfig {
            bind: "not-an-address".to_string(),
            ..GatewayConfig::default()
        });
        assert!(matches!(gw.bind().await, Err(GatewayError::AddrParse(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_serve() {
        let gw = gateway(GatewayConfig {
            bind: "127.0.0.1:0".to_string(),
            ..GatewayConfig::default()
        });
        let listener = gw.bind().await.unwrap();
        let server = tokio::spawn({
            let gw = gw.clone();
            async move { gw.serve(listener).await }
        });

        gw.shutdown();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("serve must return after shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(gw.connection_count(), 0);
        assert_eq!(gw.to_string(), "Gateway(127.0.0.1:0/ws)");
    }
}
