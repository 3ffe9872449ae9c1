//! Application messages.
//!
//! A [`Message`] is what the processor hands out once a data message (all
//! of its fragments) or a control frame has been received, and what the
//! caller gives to [`Processor::prepare_data_frame`](crate::Processor::prepare_data_frame)
//! to send one.

use bytes::{Bytes, BytesMut};

use crate::close::{CloseFrame, parse_close_payload};
use crate::error::Result;
use crate::protocol::OpCode;

/// A complete (or in-progress) WebSocket message.
///
/// The opcode is never `Continuation`: fragments are folded into the
/// message started by the first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    opcode: OpCode,
    payload: BytesMut,
    fin: bool,
    compressed: bool,
}

impl Message {
    /// Create an empty, unfinished message.
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            payload: BytesMut::new(),
            fin: false,
            compressed: false,
        }
    }

    /// Create a finished message holding `payload`.
    #[must_use]
    pub fn with_payload(opcode: OpCode, payload: impl AsRef<[u8]>) -> Self {
        Self {
            opcode,
            payload: BytesMut::from(payload.as_ref()),
            fin: true,
            compressed: false,
        }
    }

    /// Finished text message.
    #[must_use]
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::with_payload(OpCode::Text, text.as_ref())
    }

    /// Finished binary message.
    #[must_use]
    pub fn binary(data: impl AsRef<[u8]>) -> Self {
        Self::with_payload(OpCode::Binary, data)
    }

    /// Request permessage-deflate for this message when sending.
    #[must_use]
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Message opcode.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// `true` once the final fragment has been received.
    #[must_use]
    pub fn fin(&self) -> bool {
        self.fin
    }

    /// `true` if the message was (or should be) sent compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as text, if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Decode a close message's payload.
    ///
    /// # Errors
    ///
    /// See [`parse_close_payload`].
    pub fn close_frame(&self) -> Result<Option<CloseFrame>> {
        parse_close_payload(&self.payload)
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Take the payload, freezing it.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload.freeze()
    }

    pub(crate) fn payload_mut(&mut self) -> &mut BytesMut {
        &mut self.payload
    }

    pub(crate) fn set_fin(&mut self, fin: bool) {
        self.fin = fin;
    }

    pub(crate) fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::text("hello");
        assert_eq!(msg.opcode(), OpCode::Text);
        assert!(msg.fin());
        assert!(!msg.is_compressed());
        assert_eq!(msg.as_text(), Some("hello"));

        let msg = Message::binary([1u8, 2, 3]).compressed(true);
        assert_eq!(msg.opcode(), OpCode::Binary);
        assert_eq!(msg.payload(), &[1, 2, 3]);
        assert!(msg.is_compressed());
        assert_eq!(msg.len(), 3);
    }

    #[test]
    fn test_message_new_is_unfinished() {
        let mut msg = Message::new(OpCode::Text);
        assert!(!msg.fin());
        assert!(msg.is_empty());
        msg.payload_mut().extend_from_slice(b"hi");
        msg.set_fin(true);
        assert!(msg.fin());
        assert_eq!(msg.into_payload(), Bytes::from_static(b"hi"));
    }

    #[test]
    fn test_close_frame_decoding() {
        let msg = Message::with_payload(OpCode::Close, [0x03, 0xe8, b'o', b'k']);
        let frame = msg.close_frame().unwrap().unwrap();
        assert_eq!(frame.code, crate::close::CloseCode::Normal);
        assert_eq!(frame.reason, "ok");

        assert_eq!(Message::with_payload(OpCode::Close, b"").close_frame().unwrap(), None);
    }
}
