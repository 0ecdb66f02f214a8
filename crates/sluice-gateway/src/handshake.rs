//! HTTP upgrade checks
//!
//! tungstenite performs the RFC 6455 handshake itself; these checks run
//! inside its header callback so requests for the wrong path or protocol
//! version are refused with a plain HTTP error before any frame is exchanged.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::{header, Method, StatusCode};

/// The only protocol version accepted
pub const WEBSOCKET_VERSION: &str = "13";

/// Reasons an upgrade request is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    #[error("no WebSocket endpoint at {0}")]
    WrongPath(String),
    #[error("not a WebSocket upgrade request")]
    NotUpgrade,
    #[error("missing Sec-WebSocket-Key")]
    MissingKey,
    #[error("Sec-WebSocket-Key is not a 16-byte base64 nonce")]
    InvalidKey,
    #[error("unsupported WebSocket version: {0}")]
    UnsupportedVersion(String),
}

impl HandshakeError {
    pub fn status(&self) -> StatusCode {
        match self {
            HandshakeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            HandshakeError::WrongPath(_) => StatusCode::NOT_FOUND,
            HandshakeError::UnsupportedVersion(_) => StatusCode::UPGRADE_REQUIRED,
            HandshakeError::NotUpgrade | HandshakeError::MissingKey | HandshakeError::InvalidKey => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    /// HTTP response refusing the upgrade
    pub fn to_response(&self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.to_string()));
        *response.status_mut() = self.status();
        if let HandshakeError::UnsupportedVersion(_) = self {
            response.headers_mut().insert(
                header::SEC_WEBSOCKET_VERSION,
                header::HeaderValue::from_static(WEBSOCKET_VERSION),
            );
        }
        response
    }
}

/// Check an upgrade request against the served `path`.
///
/// Returns the `Sec-WebSocket-Accept` value the response must carry.
pub fn validate_upgrade(request: &Request, path: &str) -> Result<String, HandshakeError> {
    if *request.method() != Method::GET {
        return Err(HandshakeError::MethodNotAllowed(request.method().to_string()));
    }

    if request.uri().path() != path {
        return Err(HandshakeError::WrongPath(request.uri().path().to_string()));
    }

    let upgrade = header_str(request, header::UPGRADE).unwrap_or_default();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::NotUpgrade);
    }

    let version = header_str(request, header::SEC_WEBSOCKET_VERSION).unwrap_or_default();
    if version.trim() != WEBSOCKET_VERSION {
        return Err(HandshakeError::UnsupportedVersion(version.to_string()));
    }

    let key = header_str(request, header::SEC_WEBSOCKET_KEY)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;
    match STANDARD.decode(key) {
        Ok(nonce) if nonce.len() == 16 => {}
        _ => return Err(HandshakeError::InvalidKey),
    }

    Ok(accept_key(key))
}

/// `Sec-WebSocket-Accept` for a client key: base64(SHA-1(key + GUID))
pub fn accept_key(client_key: &str) -> String {
    derive_accept_key(client_key.as_bytes())
}

fn header_str(request: &Request, name: header::HeaderName) -> Option<&str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}
