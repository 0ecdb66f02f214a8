//! Sluice Gateway - WebSocket front end for streaming chat completions
//!
//! Clients connect over WebSocket, send `chat_request` frames and receive the
//! model's reply as a stream of frames. Each connection multiplexes any number
//! of concurrent requests, correlated by the client's `requestId`.
//!
//! ```no_run
//! use sluice_gateway::{ChatBackend, Gateway, GatewayConfig};
//! use sluice_llm::MockProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = ChatBackend::new(Arc::new(MockProvider::with_text_response("Hello!")));
//!     let gateway = Gateway::new(GatewayConfig::default(), backend);
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```

mod backend;
mod connection;
mod gateway;
pub mod handshake;
pub mod protocol;
mod registry;
mod session;

pub use backend::ChatBackend;
pub use connection::{ConnectionError, ConnectionManager, ConnectionState};
pub use gateway::{Gateway, GatewayConfig, GatewayError};
pub use handshake::{accept_key, validate_upgrade, HandshakeError};
pub use protocol::{decode, encode, ClientFrame, DecodeError, ErrorCode, ServerFrame};
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use session::{parse_history, RequestSession, SessionState};
