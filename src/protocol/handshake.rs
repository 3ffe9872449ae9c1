//! Opening handshake (RFC 6455 Section 4).
//!
//! Server side: [`validate_handshake`] checks an upgrade request and
//! [`process_handshake`] fills in the `101 Switching Protocols` answer.
//! Client side: [`client_handshake_request`] builds the upgrade request
//! and [`validate_server_handshake_response`] checks what came back.
//! Extension negotiation needs per-connection state and lives on the
//! processor.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::http::{self, Request, Response};
use crate::rng::RandomSource;
use crate::uri::WsUri;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol version this crate speaks.
pub const WS_VERSION: u16 = 13;

/// Header names used by the handshake.
#[allow(missing_docs)]
pub mod headers {
    pub const HOST: &str = "Host";
    pub const UPGRADE: &str = "Upgrade";
    pub const CONNECTION: &str = "Connection";
    pub const ORIGIN: &str = "Origin";
    pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
    pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
    pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";
    pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";
    pub const SEC_WEBSOCKET_EXTENSIONS: &str = "Sec-WebSocket-Extensions";
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use hybi13::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Propagates a failure of the random source.
pub fn generate_key(rng: &mut dyn RandomSource) -> Result<String> {
    let mut nonce = [0u8; 16];
    rng.fill_bytes(&mut nonce)?;
    Ok(BASE64.encode(nonce))
}

/// `true` if the request asks for a WebSocket upgrade.
#[must_use]
pub fn is_websocket_handshake(request: &Request) -> bool {
    request.headers.has_token(headers::UPGRADE, "websocket")
        && request.headers.has_token(headers::CONNECTION, "upgrade")
}

/// Value of `Sec-WebSocket-Version`, if present and numeric.
#[must_use]
pub fn websocket_version(request: &Request) -> Option<u16> {
    request
        .header(headers::SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.trim().parse().ok())
}

/// Value of the `Origin` header.
#[must_use]
pub fn origin(request: &Request) -> Option<&str> {
    request.header(headers::ORIGIN)
}

/// Rebuild the URI the client connected to from `Host` and the request
/// target. `secure` selects `wss` and its default port.
///
/// # Errors
///
/// - `Error::MissingRequiredHeader` if there is no `Host` header
/// - `Error::InvalidUri` if host or target cannot form a URI
pub fn request_uri(request: &Request, secure: bool) -> Result<WsUri> {
    let host = request
        .header(headers::HOST)
        .ok_or_else(|| Error::MissingRequiredHeader(headers::HOST.into()))?;
    if !request.uri.starts_with('/') {
        return Err(Error::InvalidUri(format!("invalid request target: {}", request.uri)));
    }
    let scheme = if secure { "wss" } else { "ws" };
    WsUri::parse(&format!("{}://{}{}", scheme, host.trim(), request.uri))
}

/// Subprotocols offered in `Sec-WebSocket-Protocol`, in the client's
/// order of preference. An absent header yields an empty list.
///
/// # Errors
///
/// Returns `Error::SubprotocolParseError` if the header is not a token list.
pub fn extract_subprotocols(request: &Request) -> Result<Vec<String>> {
    match request.header(headers::SEC_WEBSOCKET_PROTOCOL) {
        None => Ok(Vec::new()),
        Some(value) => http::token_list(value).ok_or(Error::SubprotocolParseError),
    }
}

/// Validate an inbound upgrade request.
///
/// # Errors
///
/// - `Error::InvalidHttpMethod` unless the method is `GET`
/// - `Error::InvalidHttpVersion` unless the version is `HTTP/1.1`
/// - `Error::MissingRequiredHeader` if `Sec-WebSocket-Key` is absent or empty
pub fn validate_handshake(request: &Request) -> Result<()> {
    if request.method != "GET" {
        debug!(method = %request.method, "rejecting handshake");
        return Err(Error::InvalidHttpMethod(request.method.clone()));
    }
    if request.version != "HTTP/1.1" {
        debug!(version = %request.version, "rejecting handshake");
        return Err(Error::InvalidHttpVersion(request.version.clone()));
    }
    match request.header(headers::SEC_WEBSOCKET_KEY) {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => {
            debug!("rejecting handshake without key");
            Err(Error::MissingRequiredHeader(headers::SEC_WEBSOCKET_KEY.into()))
        }
    }
}

/// Fill in the `101` response for a validated request.
///
/// Sets the status, `Upgrade`, `Connection` and `Sec-WebSocket-Accept`,
/// and `Sec-WebSocket-Protocol` when a subprotocol was chosen. Extension
/// headers are the caller's to add after negotiation.
///
/// # Errors
///
/// Returns `Error::MissingRequiredHeader` if the request has no key.
pub fn process_handshake(
    request: &Request,
    subprotocol: Option<&str>,
    response: &mut Response,
) -> Result<()> {
    let key = request
        .header(headers::SEC_WEBSOCKET_KEY)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::MissingRequiredHeader(headers::SEC_WEBSOCKET_KEY.into()))?;

    response.set_status(101);
    response.headers.insert(headers::UPGRADE, "websocket");
    response.headers.insert(headers::CONNECTION, "Upgrade");
    response
        .headers
        .insert(headers::SEC_WEBSOCKET_ACCEPT, compute_accept_key(key));
    if let Some(protocol) = subprotocol {
        response
            .headers
            .insert(headers::SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    Ok(())
}

/// Build a client upgrade request for `uri` with the given key.
///
/// `subprotocols` are sent in order of preference. `extension_offer` is
/// the `Sec-WebSocket-Extensions` value, if any.
#[must_use]
pub fn client_handshake_request(
    uri: &WsUri,
    key: &str,
    subprotocols: &[&str],
    extension_offer: Option<&str>,
) -> Request {
    let mut request = Request::new("GET", uri.resource());
    request.headers.insert(headers::HOST, uri.host_header());
    request.headers.insert(headers::UPGRADE, "websocket");
    request.headers.insert(headers::CONNECTION, "upgrade");
    request
        .headers
        .insert(headers::SEC_WEBSOCKET_VERSION, WS_VERSION.to_string());
    request.headers.insert(headers::SEC_WEBSOCKET_KEY, key);
    if !subprotocols.is_empty() {
        request
            .headers
            .insert(headers::SEC_WEBSOCKET_PROTOCOL, subprotocols.join(", "));
    }
    if let Some(offer) = extension_offer {
        request.headers.insert(headers::SEC_WEBSOCKET_EXTENSIONS, offer);
    }
    request
}

/// Check a server's answer to a request built by
/// [`client_handshake_request`].
///
/// # Errors
///
/// - `Error::InvalidHttpStatus` unless the status is 101
/// - `Error::MissingRequiredHeader` if `Upgrade`, `Connection` or
///   `Sec-WebSocket-Accept` is missing or wrong
pub fn validate_server_handshake_response(request: &Request, response: &Response) -> Result<()> {
    if response.status != 101 {
        debug!(status = response.status, "server refused upgrade");
        return Err(Error::InvalidHttpStatus(response.status));
    }
    if !response.headers.has_token(headers::UPGRADE, "websocket") {
        return Err(Error::MissingRequiredHeader(headers::UPGRADE.into()));
    }
    if !response.headers.has_token(headers::CONNECTION, "upgrade") {
        return Err(Error::MissingRequiredHeader(headers::CONNECTION.into()));
    }

    let key = request
        .header(headers::SEC_WEBSOCKET_KEY)
        .ok_or_else(|| Error::MissingRequiredHeader(headers::SEC_WEBSOCKET_KEY.into()))?;
    match response.header(headers::SEC_WEBSOCKET_ACCEPT) {
        Some(accept) if accept.trim() == compute_accept_key(key.trim()) => Ok(()),
        _ => {
            debug!("server accept key mismatch");
            Err(Error::MissingRequiredHeader(
                headers::SEC_WEBSOCKET_ACCEPT.into(),
            ))
        }
    }
}
