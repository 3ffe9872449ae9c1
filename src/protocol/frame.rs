//! Frame header encoding and decoding (RFC 6455 Section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! Decoding is split in two so a streaming reader can stop between the
//! fixed two bytes ([`BasicHeader`]) and the variable tail whose size the
//! basic header announces ([`BasicHeader::extended_len`]).

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask_fast;

/// Maximum payload size for control frames.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Size of the fixed part of every header.
pub const BASIC_HEADER_LEN: usize = 2;

/// Largest variable tail: 8 length bytes plus a 4-byte key.
pub const MAX_EXTENDED_HEADER_LEN: usize = 12;

/// Largest complete header.
pub const MAX_HEADER_LEN: usize = BASIC_HEADER_LEN + MAX_EXTENDED_HEADER_LEN;

const PAYLOAD_16BIT_CODE: u8 = 126;
const PAYLOAD_64BIT_CODE: u8 = 127;

const FIN_BIT: u8 = 0x80;
const RSV1_BIT: u8 = 0x40;
const RSV2_BIT: u8 = 0x20;
const RSV3_BIT: u8 = 0x10;
const OPCODE_MASK: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN7_MASK: u8 = 0x7F;

/// The fixed two leading header bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicHeader([u8; 2]);

impl BasicHeader {
    /// Wrap the two raw bytes.
    #[must_use]
    pub const fn new(b0: u8, b1: u8) -> Self {
        Self([b0, b1])
    }

    /// Raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 2] {
        self.0
    }

    #[must_use]
    pub const fn fin(&self) -> bool {
        self.0[0] & FIN_BIT != 0
    }

    #[must_use]
    pub const fn rsv1(&self) -> bool {
        self.0[0] & RSV1_BIT != 0
    }

    #[must_use]
    pub const fn rsv2(&self) -> bool {
        self.0[0] & RSV2_BIT != 0
    }

    #[must_use]
    pub const fn rsv3(&self) -> bool {
        self.0[0] & RSV3_BIT != 0
    }

    /// Raw 4-bit opcode, possibly reserved.
    #[must_use]
    pub const fn raw_opcode(&self) -> u8 {
        self.0[0] & OPCODE_MASK
    }

    /// Decoded opcode.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOpcode` for reserved values.
    pub fn opcode(&self) -> Result<OpCode> {
        OpCode::from_u8(self.raw_opcode())
    }

    #[must_use]
    pub const fn masked(&self) -> bool {
        self.0[1] & MASK_BIT != 0
    }

    /// The 7-bit length field, including the 126/127 escape codes.
    #[must_use]
    pub const fn len7(&self) -> u8 {
        self.0[1] & LEN7_MASK
    }

    /// Number of bytes following the basic header before the payload.
    #[must_use]
    pub const fn extended_len(&self) -> usize {
        let len = match self.len7() {
            PAYLOAD_16BIT_CODE => 2,
            PAYLOAD_64BIT_CODE => 8,
            _ => 0,
        };
        if self.masked() { len + 4 } else { len }
    }
}

/// A fully decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment of a message.
    pub fin: bool,
    /// Reserved bit 1 (permessage-deflate "compressed" flag).
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Payload length in bytes.
    pub payload_len: u64,
    /// Masking key, present iff the frame is masked.
    pub masking_key: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Unmasked header with all reserved bits clear.
    #[must_use]
    pub const fn new(fin: bool, opcode: OpCode, payload_len: usize) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload_len: payload_len as u64,
            masking_key: None,
        }
    }

    /// Set the masking key.
    #[must_use]
    pub const fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.masking_key = Some(key);
        self
    }

    /// Set RSV1.
    #[must_use]
    pub const fn with_rsv1(mut self, rsv1: bool) -> Self {
        self.rsv1 = rsv1;
        self
    }

    #[must_use]
    pub const fn masked(&self) -> bool {
        self.masking_key.is_some()
    }

    /// Payload length as `usize`. Saturates on platforms too narrow to
    /// hold it; decoded headers never need to.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        usize::try_from(self.payload_len).unwrap_or(usize::MAX)
    }

    /// Size of the encoded header.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        let ext = if self.payload_len <= MAX_CONTROL_FRAME_PAYLOAD as u64 {
            0
        } else if self.payload_len <= u16::MAX as u64 {
            2
        } else {
            8
        };
        let mask = if self.masking_key.is_some() { 4 } else { 0 };
        BASIC_HEADER_LEN + ext + mask
    }

    /// Append the encoded header to `dst`, using the shortest length form.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut b0 = self.opcode.as_u8();
        if self.fin {
            b0 |= FIN_BIT;
        }
        if self.rsv1 {
            b0 |= RSV1_BIT;
        }
        if self.rsv2 {
            b0 |= RSV2_BIT;
        }
        if self.rsv3 {
            b0 |= RSV3_BIT;
        }
        dst.put_u8(b0);

        let mask_bit = if self.masking_key.is_some() { MASK_BIT } else { 0 };
        if self.payload_len <= MAX_CONTROL_FRAME_PAYLOAD as u64 {
            dst.put_u8(mask_bit | self.payload_len as u8);
        } else if self.payload_len <= u16::MAX as u64 {
            dst.put_u8(mask_bit | PAYLOAD_16BIT_CODE);
            dst.put_u16(self.payload_len as u16);
        } else {
            dst.put_u8(mask_bit | PAYLOAD_64BIT_CODE);
            dst.put_u64(self.payload_len);
        }

        if let Some(key) = self.masking_key {
            dst.put_slice(&key);
        }
    }

    /// Encoded header as a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf
    }

    /// Complete a header from its basic part and exactly
    /// `basic.extended_len()` following bytes.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidOpcode` for reserved opcodes
    /// - `Error::NonMinimalEncoding` if a shorter length form would do
    /// - `Error::InvalidPayloadLength` if the 64-bit length has its top bit set
    /// - `Error::Requires64Bit` if the length does not fit in `usize`
    pub fn from_parts(basic: BasicHeader, extended: &[u8]) -> Result<Self> {
        debug_assert_eq!(extended.len(), basic.extended_len());
        let opcode = basic.opcode()?;

        let (payload_len, key_offset) = match basic.len7() {
            PAYLOAD_16BIT_CODE => {
                let len = u16::from_be_bytes([extended[0], extended[1]]) as u64;
                if len <= MAX_CONTROL_FRAME_PAYLOAD as u64 {
                    return Err(Error::NonMinimalEncoding);
                }
                (len, 2)
            }
            PAYLOAD_64BIT_CODE => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&extended[..8]);
                let len = u64::from_be_bytes(raw);
                if len & (1 << 63) != 0 {
                    return Err(Error::InvalidPayloadLength);
                }
                if len <= u16::MAX as u64 {
                    return Err(Error::NonMinimalEncoding);
                }
                if usize::try_from(len).is_err() {
                    return Err(Error::Requires64Bit(len));
                }
                (len, 8)
            }
            len7 => (len7 as u64, 0),
        };

        let masking_key = basic.masked().then(|| {
            [
                extended[key_offset],
                extended[key_offset + 1],
                extended[key_offset + 2],
                extended[key_offset + 3],
            ]
        });

        Ok(Self {
            fin: basic.fin(),
            rsv1: basic.rsv1(),
            rsv2: basic.rsv2(),
            rsv3: basic.rsv3(),
            opcode,
            payload_len,
            masking_key,
        })
    }

    /// Decode a header from the front of `buf`.
    ///
    /// Returns the header and its encoded length, or `None` if `buf` does
    /// not yet hold the whole header.
    ///
    /// # Errors
    ///
    /// See [`FrameHeader::from_parts`].
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        if buf.len() < BASIC_HEADER_LEN {
            return Ok(None);
        }
        let basic = BasicHeader::new(buf[0], buf[1]);
        let total = BASIC_HEADER_LEN + basic.extended_len();
        if buf.len() < total {
            return Ok(None);
        }
        let header = Self::from_parts(basic, &buf[BASIC_HEADER_LEN..total])?;
        Ok(Some((header, total)))
    }
}

/// Encode a complete frame, masking the payload when the header carries a key.
#[must_use]
pub fn encode_frame(header: &FrameHeader, payload: &[u8]) -> Vec<u8> {
    debug_assert_eq!(header.payload_len, payload.len() as u64);
    let mut buf = Vec::with_capacity(header.encoded_len() + payload.len());
    header.encode(&mut buf);
    let start = buf.len();
    buf.extend_from_slice(payload);
    if let Some(key) = header.masking_key {
        apply_mask_fast(&mut buf[start..], key);
    }
    buf
}
