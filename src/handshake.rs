//! Upgrade preconditions and the `101 Switching Protocols` reply.
//!
//! Checks follow RFC 6455 §4.2.1. They all run before the socket is taken
//! over, so a failure can still be answered with a regular HTTP error.

use bytes::Bytes;
use http::{HeaderMap, Version, header};
use http_body_util::Full;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::error::HandshakeError;
use crate::method::Method;
use crate::request::{Request, has_token};

const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";
const SEC_WEBSOCKET_VERSION: &str = "sec-websocket-version";
const SEC_WEBSOCKET_PROTOCOL: &str = "sec-websocket-protocol";
const SEC_WEBSOCKET_ACCEPT: &str = "sec-websocket-accept";

/// A request that satisfied every upgrade precondition.
#[derive(Debug)]
pub(crate) struct Accepted {
    accept: String,
    pub(crate) protocol: Option<String>,
}

/// Validates `req` as a WebSocket opening handshake and picks a subprotocol:
/// the first one the client offers that `supported` lists.
pub(crate) fn accept(req: &Request, supported: &[String]) -> Result<Accepted, HandshakeError> {
    if req.method() != Method::Get {
        return Err(HandshakeError::Method(req.method().to_string()));
    }
    if req.version() != Version::HTTP_11 {
        return Err(HandshakeError::Version);
    }
    let headers = req.headers();
    if !has_token(headers, header::CONNECTION, "upgrade") {
        return Err(HandshakeError::MissingConnectionUpgrade);
    }
    let upgrade = req.header(header::UPGRADE.as_str()).unwrap_or_default();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::Protocol(upgrade.to_owned()));
    }
    if req.header(SEC_WEBSOCKET_VERSION).map(str::trim) != Some("13") {
        return Err(HandshakeError::UnsupportedVersion);
    }
    // base64 of a 16-byte nonce is always 24 characters ending in "=="
    let key = req.header(SEC_WEBSOCKET_KEY).map(str::trim).unwrap_or_default();
    if key.len() != 24 || !key.ends_with("==") {
        return Err(HandshakeError::InvalidKey);
    }

    Ok(Accepted {
        accept: derive_accept_key(key.as_bytes()),
        protocol: negotiate(headers, supported),
    })
}

fn negotiate(headers: &HeaderMap, supported: &[String]) -> Option<String> {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .find(|offered| supported.iter().any(|s| s == offered))
        .map(str::to_owned)
}

/// The reply that hands the connection over.
pub(crate) fn switching_protocols(accepted: &Accepted) -> http::Response<Full<Bytes>> {
    let mut res = http::Response::new(Full::new(Bytes::new()));
    *res.status_mut() = http::StatusCode::SWITCHING_PROTOCOLS;
    let headers = res.headers_mut();
    headers.insert(header::CONNECTION, header::HeaderValue::from_static("upgrade"));
    headers.insert(header::UPGRADE, header::HeaderValue::from_static("websocket"));
    if let Ok(v) = header::HeaderValue::from_str(&accepted.accept) {
        headers.insert(SEC_WEBSOCKET_ACCEPT, v);
    }
    if let Some(v) = accepted.protocol.as_deref().and_then(|p| header::HeaderValue::from_str(p).ok()) {
        headers.insert(SEC_WEBSOCKET_PROTOCOL, v);
    }
    res
}
