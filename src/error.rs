//! Error types for the WebSocket protocol processor.
//!
//! Every operation reports failure as a value of [`Error`]. Nothing is
//! retried internally; a frame-level error leaves the processor in its
//! terminal failed state and the connection layer decides how to close.

use thiserror::Error;

use crate::close::CloseCode;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while processing WebSocket frames and handshakes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // ------------------------------------------------------------------
    // Framing / protocol
    // ------------------------------------------------------------------
    /// Reserved or unknown opcode.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// RSV bit set without a negotiated extension that defines it.
    #[error("Reserved bit set without negotiated extension")]
    InvalidRsvBit,

    /// Payload length used a wider encoding than required.
    #[error("Payload length not minimally encoded")]
    NonMinimalEncoding,

    /// 64-bit payload length with the most significant bit set.
    #[error("Invalid 64-bit payload length")]
    InvalidPayloadLength,

    /// Payload length does not fit the platform's `usize`.
    #[error("Payload of {0} bytes requires a 64-bit platform")]
    Requires64Bit(u64),

    /// Control frame with FIN=0.
    #[error("Control frames cannot be fragmented")]
    FragmentedControl,

    /// Continuation frame without an open message, or a new data frame
    /// while a message is still open.
    #[error("Invalid continuation frame sequence")]
    InvalidContinuation,

    /// Server received an unmasked frame.
    #[error("Client frames must be masked")]
    MaskingRequired,

    /// Client received a masked frame.
    #[error("Server frames must not be masked")]
    MaskingForbidden,

    /// Control frame payload larger than 125 bytes.
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlTooBig(usize),

    /// Message size exceeds the configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooBig {
        /// Size the message would reach.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid UTF-8 in a text message or close reason.
    #[error("Invalid UTF-8 in text payload")]
    InvalidUtf8,

    // ------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------
    /// Opening handshake used a method other than GET.
    #[error("Invalid HTTP method: {0}")]
    InvalidHttpMethod(String),

    /// Opening handshake used a version other than HTTP/1.1.
    #[error("Invalid HTTP version: {0}")]
    InvalidHttpVersion(String),

    /// A required handshake header is missing or has the wrong value.
    #[error("Missing or invalid required header: {0}")]
    MissingRequiredHeader(String),

    /// Server answered with a status other than 101.
    #[error("Invalid HTTP status: {0}")]
    InvalidHttpStatus(u16),

    /// Sec-WebSocket-Protocol header could not be parsed.
    #[error("Unable to parse Sec-WebSocket-Protocol header")]
    SubprotocolParseError,

    /// Sec-WebSocket-Extensions header could not be parsed.
    #[error("Unable to parse Sec-WebSocket-Extensions header")]
    ExtensionParseError,

    /// Extensions were offered but no extension support is available.
    #[error("Extensions are disabled")]
    ExtensionsDisabled,

    /// URI could not be parsed as a WebSocket URI.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Raw HTTP message could not be parsed.
    #[error("Malformed HTTP message: {0}")]
    MalformedHttp(String),

    // ------------------------------------------------------------------
    // Close frames
    // ------------------------------------------------------------------
    /// Close code reserved for future use or local signalling.
    #[error("Reserved close code: {0}")]
    ReservedCloseCode(u16),

    /// Close code outside any valid range.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// A close reason was supplied without a status code.
    #[error("Close reason requires a status code")]
    ReasonRequiresCode,

    /// Close payload of exactly one byte.
    #[error("Malformed close payload")]
    BadClosePayload,

    // ------------------------------------------------------------------
    // Extensions
    // ------------------------------------------------------------------
    /// Unknown or duplicated extension attribute.
    #[error("Invalid extension attributes: {0}")]
    InvalidAttributes(String),

    /// Known extension attribute with an unacceptable value.
    #[error("Invalid value for extension attribute {0}")]
    InvalidAttributeValue(String),

    /// Operation requires a negotiated extension.
    #[error("Extension has not been negotiated")]
    ExtensionNotEnabled,

    /// DEFLATE codec failure.
    #[error("Compression error: {0}")]
    Compression(String),

    // ------------------------------------------------------------------
    // Environment
    // ------------------------------------------------------------------
    /// The random source could not produce entropy.
    #[error("Random source failure: {0}")]
    Random(String),
}

impl Error {
    /// Close status code a connection should send after this error.
    #[must_use]
    pub const fn close_code(&self) -> CloseCode {
        match self {
            Error::InvalidUtf8 => CloseCode::InvalidPayload,
            Error::MessageTooBig { .. } | Error::Requires64Bit(_) => CloseCode::MessageTooBig,
            Error::Compression(_) => CloseCode::InvalidPayload,
            Error::ExtensionNotEnabled | Error::Random(_) => CloseCode::InternalError,
            _ => CloseCode::ProtocolError,
        }
    }

    /// Returns `true` for errors raised while parsing incoming frames.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidOpcode(_)
                | Error::InvalidRsvBit
                | Error::NonMinimalEncoding
                | Error::InvalidPayloadLength
                | Error::Requires64Bit(_)
                | Error::FragmentedControl
                | Error::InvalidContinuation
                | Error::MaskingRequired
                | Error::MaskingForbidden
                | Error::ControlTooBig(_)
                | Error::MessageTooBig { .. }
                | Error::InvalidUtf8
        )
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
