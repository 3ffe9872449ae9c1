//! WebSocket extensions (RFC 6455 Section 9).
//!
//! The processor holds exactly one `Box<dyn Extension>`. With the
//! `compression` feature and a [`DeflateConfig`](crate::config::DeflateConfig)
//! that is [`deflate::PerMessageDeflate`]; otherwise it is [`Disabled`],
//! which reports itself as unimplemented and refuses to negotiate.

#[cfg(feature = "compression")]
pub mod deflate;

use std::fmt;

use crate::error::{Error, Result};
use crate::protocol::http;

/// Registered name of the permessage-deflate extension.
pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

/// Represents a single extension parameter.
///
/// Extension parameters follow the format: `name; param1=value1; param2`
/// For example: `permessage-deflate; client_max_window_bits=15; server_no_context_takeover`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionParam {
    /// Parameter name (e.g., "client_max_window_bits").
    pub name: String,
    /// Optional parameter value. None for flag parameters.
    pub value: Option<String>,
}

impl ExtensionParam {
    /// Create a new parameter with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Create a flag parameter (no value).
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

impl fmt::Display for ExtensionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One entry of a `Sec-WebSocket-Extensions` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionOffer {
    /// Extension name (e.g., "permessage-deflate").
    pub name: String,
    /// Extension parameters, in header order.
    pub params: Vec<ExtensionParam>,
}

impl ExtensionOffer {
    /// Create a new extension offer with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Create a new extension offer with parameters.
    pub fn with_params(name: impl Into<String>, params: Vec<ExtensionParam>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Parse a full `Sec-WebSocket-Extensions` header value.
    ///
    /// # Errors
    ///
    /// Returns `Error::ExtensionParseError` on malformed input.
    pub fn parse_header(header: &str) -> Result<Vec<Self>> {
        http::parameter_list(header)
    }

    /// Get a parameter by name.
    pub fn get_param(&self, name: &str) -> Option<&ExtensionParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check if a parameter is present.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}

impl fmt::Display for ExtensionOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for param in &self.params {
            write!(f, "; {}", param)?;
        }
        Ok(())
    }
}

/// A negotiable per-message extension.
///
/// Implementations own whatever codec state the extension needs. That
/// state is private to one connection.
pub trait Extension: Send {
    /// Name as used in `Sec-WebSocket-Extensions`.
    fn name(&self) -> &str;

    /// `false` for the no-op placeholder.
    fn is_implemented(&self) -> bool;

    /// `true` once negotiation (server) or configuration (client) succeeded.
    fn is_enabled(&self) -> bool;

    /// Client offer for the `Sec-WebSocket-Extensions` header.
    fn generate_offer(&self) -> String;

    /// Server side: answer a client's offer. On success the extension is
    /// enabled and the returned string is the response header value.
    ///
    /// # Errors
    ///
    /// `Error::InvalidAttributes` or `Error::InvalidAttributeValue` when the
    /// offer cannot be accepted.
    fn negotiate(&mut self, params: &[ExtensionParam]) -> Result<String>;

    /// Client side: apply the server's response to our offer.
    ///
    /// # Errors
    ///
    /// `Error::InvalidAttributes` or `Error::InvalidAttributeValue` when the
    /// response is not acceptable.
    fn configure(&mut self, params: &[ExtensionParam]) -> Result<()>;

    /// Compress one complete outgoing message, appending to `out`.
    ///
    /// # Errors
    ///
    /// `Error::ExtensionNotEnabled` before negotiation, `Error::Compression`
    /// on codec failure.
    fn compress(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Decompress the next piece of an incoming message, appending to
    /// `out`. `fin` marks the last piece of the message.
    ///
    /// # Errors
    ///
    /// `Error::ExtensionNotEnabled` before negotiation, `Error::Compression`
    /// on corrupt input, `Error::MessageTooBig` when the output passes the
    /// configured limit.
    fn decompress(&mut self, input: &[u8], fin: bool, out: &mut Vec<u8>) -> Result<()>;

    /// Drop the outgoing compression history.
    fn reset_compress_context(&mut self);

    /// Drop the incoming decompression history.
    fn reset_decompress_context(&mut self);
}

/// Placeholder used when no extension is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

impl Extension for Disabled {
    fn name(&self) -> &str {
        PERMESSAGE_DEFLATE
    }

    fn is_implemented(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn generate_offer(&self) -> String {
        String::new()
    }

    fn negotiate(&mut self, _params: &[ExtensionParam]) -> Result<String> {
        Err(Error::ExtensionsDisabled)
    }

    fn configure(&mut self, _params: &[ExtensionParam]) -> Result<()> {
        Err(Error::ExtensionsDisabled)
    }

    fn compress(&mut self, _input: &[u8], _out: &mut Vec<u8>) -> Result<()> {
        Err(Error::ExtensionNotEnabled)
    }

    fn decompress(&mut self, _input: &[u8], _fin: bool, _out: &mut Vec<u8>) -> Result<()> {
        Err(Error::ExtensionNotEnabled)
    }

    fn reset_compress_context(&mut self) {}

    fn reset_decompress_context(&mut self) {}
}

impl fmt::Debug for dyn Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name())
            .field("implemented", &self.is_implemented())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
