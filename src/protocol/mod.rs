//! WebSocket protocol core implementation (RFC 6455).

pub mod frame;
pub mod handshake;
pub mod http;
pub mod mask;
pub mod opcode;
pub mod utf8;

pub use frame::{BasicHeader, FrameHeader, encode_frame};
pub use handshake::{WS_GUID, WS_VERSION, compute_accept_key};
pub use http::{HeaderMap, Request, Response};
pub use mask::{MaskingKey, apply_mask, apply_mask_fast};
pub use opcode::OpCode;
pub use utf8::{Utf8Validator, validate_utf8};
