//! Close status codes and close frame payloads (RFC 6455 Section 7.4).

use crate::error::{Error, Result};
use crate::protocol::frame::MAX_CONTROL_FRAME_PAYLOAD;

/// Maximum length of a close reason in bytes (125 minus the 2-byte code).
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_FRAME_PAYLOAD - 2;

/// WebSocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001). Server shutdown or browser navigating away.
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// No status received (1005). Never sent on the wire; stands for an
    /// empty close payload.
    NoStatus,
    /// Abnormal closure (1006). Never sent on the wire.
    Abnormal,
    /// Invalid payload (1007), e.g. non-UTF-8 text.
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Mandatory extension (1010).
    MandatoryExtension,
    /// Internal error (1011).
    InternalError,
    /// Any other code (1012-1014 registered, 3000-4999 applications).
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Codes reserved by the protocol for future use: 1004 and 1016-2999.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004 | 1016..=2999)
    }

    /// Codes that must never appear in a close frame: anything below 1000
    /// or above 4999, and the local-only 1005, 1006 and 1015.
    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        matches!(self.as_u16(), 0..=999 | 1005 | 1006 | 1015 | 5000..=u16::MAX)
    }

    /// Check if this code may be sent in a close frame.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !self.is_reserved() && !self.is_invalid()
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Decoded close frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close status code.
    pub code: CloseCode,
    /// Human-readable reason (UTF-8, at most 123 bytes).
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame with the given code and reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Build the payload of an outgoing close frame.
///
/// `CloseCode::NoStatus` produces an empty payload.
///
/// # Errors
///
/// Checked in this order:
/// - `Error::ReservedCloseCode` for reserved codes
/// - `Error::InvalidCloseCode` for codes that must not be sent
/// - `Error::ReasonRequiresCode` for a reason without a code
/// - `Error::ControlTooBig` if the reason is longer than 123 bytes
pub fn close_payload(code: CloseCode, reason: &str) -> Result<Vec<u8>> {
    let code = CloseCode::from_u16(code.as_u16());
    if code.is_reserved() {
        return Err(Error::ReservedCloseCode(code.as_u16()));
    }
    if code.is_invalid() && code != CloseCode::NoStatus {
        return Err(Error::InvalidCloseCode(code.as_u16()));
    }
    if code == CloseCode::NoStatus {
        if !reason.is_empty() {
            return Err(Error::ReasonRequiresCode);
        }
        return Ok(Vec::new());
    }
    if reason.len() > MAX_CLOSE_REASON {
        return Err(Error::ControlTooBig(reason.len() + 2));
    }

    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.as_u16().to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    Ok(payload)
}

/// Parse the payload of a received close frame.
///
/// Returns `None` for an empty payload, which stands for
/// [`CloseCode::NoStatus`].
///
/// # Errors
///
/// - `Error::BadClosePayload` for a 1-byte payload
/// - `Error::ReservedCloseCode` / `Error::InvalidCloseCode` for bad codes
/// - `Error::InvalidUtf8` if the reason is not UTF-8
pub fn parse_close_payload(payload: &[u8]) -> Result<Option<CloseFrame>> {
    match payload {
        [] => Ok(None),
        [_] => Err(Error::BadClosePayload),
        [hi, lo, reason @ ..] => {
            let code = CloseCode::from_u16(u16::from_be_bytes([*hi, *lo]));
            if code.is_reserved() {
                return Err(Error::ReservedCloseCode(code.as_u16()));
            }
            if code.is_invalid() {
                return Err(Error::InvalidCloseCode(code.as_u16()));
            }
            let reason = std::str::from_utf8(reason)?;
            Ok(Some(CloseFrame::new(code, reason)))
        }
    }
}
