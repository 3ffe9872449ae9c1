//! WebSocket URIs (RFC 6455 Section 3).

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default port for `ws://`.
pub const DEFAULT_PORT: u16 = 80;
/// Default port for `wss://`.
pub const DEFAULT_SECURE_PORT: u16 = 443;

/// A parsed `ws://` or `wss://` URI.
///
/// `http` and `https` schemes are accepted as aliases. IPv6 literals are
/// stored without their brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WsUri {
    secure: bool,
    host: String,
    port: u16,
    resource: String,
}

impl WsUri {
    /// Build a URI from its parts. An empty resource becomes `/`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUri` if the host is empty.
    pub fn new(secure: bool, host: &str, port: u16, resource: &str) -> Result<Self> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::InvalidUri("empty host".into()));
        }
        let resource = if resource.is_empty() {
            "/".to_string()
        } else {
            resource.to_string()
        };
        Ok(Self {
            secure,
            host: host.to_string(),
            port,
            resource,
        })
    }

    /// Parse a URI string.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUri` for an unknown scheme, an empty or
    /// malformed host, a bad port, or a fragment.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| Error::InvalidUri(format!("missing scheme: {}", uri)))?;

        let secure = match scheme.to_ascii_lowercase().as_str() {
            "ws" | "http" => false,
            "wss" | "https" => true,
            other => return Err(Error::InvalidUri(format!("unsupported scheme: {}", other))),
        };

        if rest.contains('#') {
            return Err(Error::InvalidUri("fragments are not allowed".into()));
        }

        let split = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, resource) = rest.split_at(split);
        let resource = match resource.chars().next() {
            Some('?') => format!("/{}", resource),
            _ => resource.to_string(),
        };

        let (host, port) = split_authority(authority)?;
        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| Error::InvalidUri(format!("invalid port: {}", port)))?,
            None => default_port(secure),
        };

        Self::new(secure, host, port, &resource)
    }

    /// `true` for `wss://`.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Host name or address, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number, explicit or defaulted from the scheme.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path and query, always starting with `/`.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// `true` if the port is the scheme's default.
    #[must_use]
    pub fn is_default_port(&self) -> bool {
        self.port == default_port(self.secure)
    }

    /// Value for the `Host` request header. The port is omitted when it
    /// is the default for the scheme.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.is_default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

const fn default_port(secure: bool) -> u16 {
    if secure { DEFAULT_SECURE_PORT } else { DEFAULT_PORT }
}

/// Split `host[:port]` or `[v6]:port` into host and optional port text.
fn split_authority(authority: &str) -> Result<(&str, Option<&str>)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::InvalidUri(format!("unterminated IPv6 literal: {}", authority)))?;
        return match after {
            "" => Ok((host, None)),
            _ => match after.strip_prefix(':') {
                Some(port) => Ok((host, Some(port))),
                None => Err(Error::InvalidUri(format!("invalid authority: {}", authority))),
            },
        };
    }

    match authority.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => {
            Err(Error::InvalidUri(format!("IPv6 host must be bracketed: {}", authority)))
        }
        Some((host, port)) => Ok((host, Some(port))),
        None => Ok((authority, None)),
    }
}

impl FromStr for WsUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for WsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "wss" } else { "ws" };
        write!(f, "{}://{}{}", scheme, self.host_header(), self.resource)
    }
}
