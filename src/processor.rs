//! The RFC 6455 frame/message processor.
//!
//! [`Processor::consume`] is a resumable parser: it takes whatever bytes
//! the transport delivered, advances through
//!
//! ```text
//! HeaderBasic -> HeaderExtended -> Application -> Ready
//!      ^                              |
//!      +---------- non-final frame ---+
//! ```
//!
//! and stops when it needs more input, when a message is ready, or on the
//! first error. Any error is terminal: the processor parks in
//! `FatalError` and reports the same error on every later call.
//!
//! Control frames may arrive between the fragments of a data message, so
//! the processor keeps two message slots. A ready control message is
//! handed out without disturbing the data message being assembled.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::close::{CloseCode, close_payload};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extensions::{Disabled, Extension, ExtensionOffer, PERMESSAGE_DEFLATE};
use crate::message::Message;
use crate::protocol::OpCode;
use crate::protocol::frame::{
    BASIC_HEADER_LEN, BasicHeader, FrameHeader, MAX_CONTROL_FRAME_PAYLOAD, MAX_HEADER_LEN,
};
use crate::protocol::handshake::{self, headers};
use crate::protocol::http::{Request, Response};
use crate::protocol::mask::{MaskingKey, apply_mask_fast};
use crate::protocol::utf8::{Utf8Validator, validate_utf8};
use crate::rng::{RandomSource, SystemRandom};
use crate::role::Role;
use crate::uri::WsUri;

/// Parse state of a [`Processor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for the two fixed header bytes.
    HeaderBasic,
    /// Waiting for the extended length and masking key.
    HeaderExtended,
    /// Reading payload bytes.
    Application,
    /// A message is waiting for [`Processor::get_message`].
    Ready,
    /// An error occurred; the stream cannot be resumed.
    FatalError,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::HeaderBasic => "header-basic",
            State::HeaderExtended => "header-extended",
            State::Application => "application",
            State::Ready => "ready",
            State::FatalError => "fatal-error",
        };
        f.write_str(name)
    }
}

/// An outgoing frame, ready for the wire.
///
/// Header and payload are kept apart so they can be written with a
/// vectored write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFrame {
    /// Encoded frame header.
    pub header: Bytes,
    /// Payload, already compressed and masked as required.
    pub payload: Bytes,
}

impl PreparedFrame {
    /// Total bytes on the wire.
    #[must_use]
    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    /// `true` only for a header-less, payload-less frame, which the
    /// processor never produces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Header followed by payload in one buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Streaming RFC 6455 processor for one connection.
pub struct Processor {
    role: Role,
    config: Config,
    rng: Box<dyn RandomSource>,
    extension: Box<dyn Extension>,

    state: State,
    error: Option<Error>,

    header_buf: [u8; MAX_HEADER_LEN],
    header_len: usize,
    header_needed: usize,
    frame: Option<FrameHeader>,
    masking_key: Option<MaskingKey>,
    bytes_needed: usize,

    control_active: bool,
    control: Option<Message>,
    data: Option<Message>,
    data_wire_len: usize,
    utf8: Utf8Validator,

    chunk_buf: Vec<u8>,
    inflated: Vec<u8>,
}

impl Processor {
    /// Create a processor for `role`.
    ///
    /// `rng` supplies masking keys and handshake nonces.
    #[must_use]
    pub fn new(role: Role, config: Config, rng: impl RandomSource + 'static) -> Self {
        let extension = build_extension(role, &config);
        Self {
            role,
            config,
            rng: Box::new(rng),
            extension,
            state: State::HeaderBasic,
            error: None,
            header_buf: [0; MAX_HEADER_LEN],
            header_len: 0,
            header_needed: BASIC_HEADER_LEN,
            frame: None,
            masking_key: None,
            bytes_needed: 0,
            control_active: false,
            control: None,
            data: None,
            data_wire_len: 0,
            utf8: Utf8Validator::new(),
            chunk_buf: Vec::new(),
            inflated: Vec::new(),
        }
    }

    /// Server processor using operating system randomness.
    #[must_use]
    pub fn server(config: Config) -> Self {
        Self::new(Role::Server, config, SystemRandom)
    }

    /// Client processor using operating system randomness.
    #[must_use]
    pub fn client(config: Config) -> Self {
        Self::new(Role::Client, config, SystemRandom)
    }

    /// Endpoint role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The extension slot.
    #[must_use]
    pub fn extension(&self) -> &dyn Extension {
        self.extension.as_ref()
    }

    /// Current parse state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// `true` if a message is waiting to be retrieved.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.state == State::Ready
    }

    /// The error that stopped the processor, if any.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Bytes still required to finish the current field.
    #[must_use]
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            State::HeaderBasic | State::HeaderExtended => self.header_needed - self.header_len,
            State::Application => self.bytes_needed,
            State::Ready | State::FatalError => 0,
        }
    }

    // ------------------------------------------------------------------
    // Incoming
    // ------------------------------------------------------------------

    /// Feed raw bytes from the transport.
    ///
    /// Returns how many bytes were used. Fewer than `buf.len()` means a
    /// message became ready; retrieve it with [`get_message`](Self::get_message)
    /// and call again with the rest.
    ///
    /// # Errors
    ///
    /// Any framing, masking, UTF-8, size or decompression violation. The
    /// processor is unusable afterwards and returns the same error again.
    pub fn consume(&mut self, buf: &[u8]) -> Result<usize> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let mut pos = 0;
        match self.consume_inner(buf, &mut pos) {
            Ok(()) => Ok(pos),
            Err(err) => {
                debug!(role = %self.role, state = %self.state, error = %err, "protocol error");
                self.state = State::FatalError;
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn consume_inner(&mut self, buf: &[u8], pos: &mut usize) -> Result<()> {
        loop {
            match self.state {
                State::Ready | State::FatalError => return Ok(()),
                State::HeaderBasic | State::HeaderExtended => {
                    if *pos == buf.len() {
                        return Ok(());
                    }
                    let take = (self.header_needed - self.header_len).min(buf.len() - *pos);
                    self.header_buf[self.header_len..self.header_len + take]
                        .copy_from_slice(&buf[*pos..*pos + take]);
                    self.header_len += take;
                    *pos += take;
                    if self.header_len < self.header_needed {
                        continue;
                    }
                    if self.state == State::HeaderBasic {
                        let basic = BasicHeader::new(self.header_buf[0], self.header_buf[1]);
                        self.validate_basic(&basic)?;
                        let extended = basic.extended_len();
                        if extended > 0 {
                            self.header_needed += extended;
                            self.transition(State::HeaderExtended);
                            continue;
                        }
                    }
                    self.finish_header()?;
                }
                State::Application => {
                    if self.bytes_needed > 0 {
                        if *pos == buf.len() {
                            return Ok(());
                        }
                        let take = self.bytes_needed.min(buf.len() - *pos);
                        self.process_payload(&buf[*pos..*pos + take])?;
                        *pos += take;
                        self.bytes_needed -= take;
                    }
                    if self.bytes_needed == 0 {
                        self.finish_frame()?;
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: State) {
        trace!(from = %self.state, to = %next, "state");
        self.state = next;
    }

    /// Decode and validate the buffered header, then enter `Application`.
    fn finish_header(&mut self) -> Result<()> {
        let basic = BasicHeader::new(self.header_buf[0], self.header_buf[1]);
        let extended = &self.header_buf[BASIC_HEADER_LEN..self.header_len];
        let header = FrameHeader::from_parts(basic, extended)?;
        trace!(
            opcode = %header.opcode,
            fin = header.fin,
            rsv1 = header.rsv1,
            masked = header.masked(),
            len = header.payload_len,
            "frame header"
        );
        self.validate_header(&header)?;

        let opcode = header.opcode;
        if opcode.is_control() {
            self.control_active = true;
            self.control = Some(Message::new(opcode));
        } else if opcode != OpCode::Continuation {
            let mut message = Message::new(opcode);
            message.set_compressed(header.rsv1);
            self.data = Some(message);
            self.data_wire_len = 0;
            self.utf8.reset();
        }
        if !opcode.is_control() {
            self.data_wire_len += header.payload_size();
        }

        self.masking_key = header.masking_key.map(MaskingKey::new);
        self.bytes_needed = header.payload_size();
        self.frame = Some(header);
        self.transition(State::Application);
        Ok(())
    }

    /// Rules decidable from the two fixed header bytes.
    fn validate_basic(&self, basic: &BasicHeader) -> Result<()> {
        let opcode = basic.opcode()?;

        if basic.rsv2() || basic.rsv3() {
            return Err(Error::InvalidRsvBit);
        }
        if basic.rsv1()
            && (opcode.is_control()
                || opcode == OpCode::Continuation
                || !self.extension.is_enabled())
        {
            return Err(Error::InvalidRsvBit);
        }

        if opcode.is_control() {
            if !basic.fin() {
                return Err(Error::FragmentedControl);
            }
            // 126 and 127 are length escapes, never legal on a control frame
            if usize::from(basic.len7()) > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlTooBig(usize::from(basic.len7())));
            }
        } else if opcode == OpCode::Continuation && self.data.is_none() {
            return Err(Error::InvalidContinuation);
        } else if opcode != OpCode::Continuation && self.data.is_some() {
            return Err(Error::InvalidContinuation);
        }

        match (self.role.expects_masked(), basic.masked()) {
            (true, false) => Err(Error::MaskingRequired),
            (false, true) => Err(Error::MaskingForbidden),
            _ => Ok(()),
        }
    }

    /// Rules that need the decoded payload length.
    fn validate_header(&self, header: &FrameHeader) -> Result<()> {
        let opcode = header.opcode;
        if !opcode.is_control() {
            let current = if opcode == OpCode::Continuation { self.data_wire_len } else { 0 };
            let size = current.saturating_add(header.payload_size());
            self.config.limits.check_message_size(size)?;
        }
        Ok(())
    }

    /// Unmask a payload chunk and append it to the active message.
    fn process_payload(&mut self, raw: &[u8]) -> Result<()> {
        let mut chunk = std::mem::take(&mut self.chunk_buf);
        chunk.clear();
        chunk.extend_from_slice(raw);
        if let Some(key) = self.masking_key.as_mut() {
            key.apply(&mut chunk);
        }
        let result = if self.control_active {
            match self.control.as_mut() {
                Some(message) => {
                    message.payload_mut().extend_from_slice(&chunk);
                    Ok(())
                }
                None => Err(Error::InvalidContinuation),
            }
        } else {
            self.append_data(&chunk, false)
        };
        self.chunk_buf = chunk;
        result
    }

    /// Append to the data message, inflating first if it is compressed.
    fn append_data(&mut self, chunk: &[u8], fin: bool) -> Result<()> {
        let message = self.data.as_mut().ok_or(Error::InvalidContinuation)?;
        let bytes = if message.is_compressed() {
            self.inflated.clear();
            self.extension.decompress(chunk, fin, &mut self.inflated)?;
            self.config
                .limits
                .check_message_size(message.len().saturating_add(self.inflated.len()))?;
            self.inflated.as_slice()
        } else {
            chunk
        };
        if message.opcode() == OpCode::Text {
            self.utf8.validate(bytes)?;
        }
        message.payload_mut().extend_from_slice(bytes);
        Ok(())
    }

    /// All payload bytes of the current frame have been read.
    fn finish_frame(&mut self) -> Result<()> {
        let fin = self.frame.as_ref().is_some_and(|f| f.fin);
        self.masking_key = None;
        self.frame = None;
        self.header_len = 0;
        self.header_needed = BASIC_HEADER_LEN;

        if self.control_active {
            if let Some(message) = self.control.as_mut() {
                message.set_fin(true);
            }
            self.transition(State::Ready);
            return Ok(());
        }
        if !fin {
            self.transition(State::HeaderBasic);
            return Ok(());
        }

        if self.data.as_ref().is_some_and(Message::is_compressed) {
            self.append_data(&[], true)?;
        }
        let message = self.data.as_mut().ok_or(Error::InvalidContinuation)?;
        if message.opcode() == OpCode::Text && !self.utf8.is_complete() {
            return Err(Error::InvalidUtf8);
        }
        message.set_fin(true);
        self.transition(State::Ready);
        Ok(())
    }

    /// Take the ready message.
    ///
    /// Returns `None` unless [`ready`](Self::ready) is true. Ownership of
    /// the message passes to the caller and parsing resumes with the next
    /// frame header.
    pub fn get_message(&mut self) -> Option<Message> {
        if self.state != State::Ready {
            return None;
        }
        let message = if self.control_active {
            self.control_active = false;
            self.control.take()
        } else {
            self.data_wire_len = 0;
            self.data.take()
        };
        self.transition(State::HeaderBasic);
        message
    }

    // ------------------------------------------------------------------
    // Outgoing
    // ------------------------------------------------------------------

    /// Frame a text or binary message for sending.
    ///
    /// The message is compressed when it asks for it and permessage-deflate
    /// has been negotiated; otherwise it goes out as is. Clients mask with
    /// a fresh key.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidOpcode` for anything but Text or Binary
    /// - `Error::InvalidUtf8` for a text message that is not UTF-8
    /// - `Error::Compression` on codec failure
    pub fn prepare_data_frame(&mut self, message: &Message) -> Result<PreparedFrame> {
        let opcode = message.opcode();
        if !opcode.is_data() {
            return Err(Error::InvalidOpcode(opcode.as_u8()));
        }
        if opcode == OpCode::Text {
            validate_utf8(message.payload())?;
        }

        let compress = message.is_compressed() && self.extension.is_enabled();
        let payload = if compress {
            let mut out = Vec::with_capacity(message.len() / 2 + 16);
            self.extension.compress(message.payload(), &mut out)?;
            out
        } else {
            message.payload().to_vec()
        };

        let header = FrameHeader::new(true, opcode, payload.len()).with_rsv1(compress);
        self.finish_outgoing(header, payload)
    }

    /// Frame a ping.
    ///
    /// # Errors
    ///
    /// `Error::ControlTooBig` for payloads over 125 bytes.
    pub fn prepare_ping(&mut self, payload: &[u8]) -> Result<PreparedFrame> {
        self.prepare_control(OpCode::Ping, payload.to_vec())
    }

    /// Frame a pong.
    ///
    /// # Errors
    ///
    /// `Error::ControlTooBig` for payloads over 125 bytes.
    pub fn prepare_pong(&mut self, payload: &[u8]) -> Result<PreparedFrame> {
        self.prepare_control(OpCode::Pong, payload.to_vec())
    }

    /// Frame a close. `CloseCode::NoStatus` sends an empty body.
    ///
    /// # Errors
    ///
    /// See [`close_payload`].
    pub fn prepare_close(&mut self, code: CloseCode, reason: &str) -> Result<PreparedFrame> {
        let payload = close_payload(code, reason)?;
        self.prepare_control(OpCode::Close, payload)
    }

    fn prepare_control(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<PreparedFrame> {
        if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlTooBig(payload.len()));
        }
        let header = FrameHeader::new(true, opcode, payload.len());
        self.finish_outgoing(header, payload)
    }

    fn finish_outgoing(
        &mut self,
        mut header: FrameHeader,
        mut payload: Vec<u8>,
    ) -> Result<PreparedFrame> {
        if self.role.must_mask() {
            let key = self.rng.next_u32()?.to_be_bytes();
            apply_mask_fast(&mut payload, key);
            header = header.with_mask(key);
        }
        Ok(PreparedFrame {
            header: header.to_bytes().freeze(),
            payload: Bytes::from(payload),
        })
    }

    // ------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------

    /// Build the client upgrade request for `uri`, including a fresh key
    /// and the extension offer when an extension is available.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUri` for a bad URI, or a random source failure.
    pub fn client_handshake_request(
        &mut self,
        uri: &str,
        subprotocols: &[&str],
    ) -> Result<Request> {
        let uri = WsUri::parse(uri)?;
        let key = handshake::generate_key(self.rng.as_mut())?;
        let offer = self
            .extension
            .is_implemented()
            .then(|| self.extension.generate_offer());
        Ok(handshake::client_handshake_request(
            &uri,
            &key,
            subprotocols,
            offer.as_deref(),
        ))
    }

    /// Server side: pick the first acceptable permessage-deflate offer.
    ///
    /// Returns the `Sec-WebSocket-Extensions` response value, or `None` if
    /// nothing was offered. Offers for other extensions are skipped.
    ///
    /// # Errors
    ///
    /// - `Error::ExtensionParseError` if the header is malformed
    /// - `Error::ExtensionsDisabled` if no extension support is available
    /// - the last rejection when every permessage-deflate offer failed
    ///
    /// These errors only mean the connection proceeds without extensions.
    pub fn negotiate_extensions(&mut self, request: &Request) -> Result<Option<String>> {
        let Some(value) = request.header(headers::SEC_WEBSOCKET_EXTENSIONS) else {
            return Ok(None);
        };
        let offers = ExtensionOffer::parse_header(value)?;
        if !self.extension.is_implemented() {
            return Err(Error::ExtensionsDisabled);
        }

        let mut last_error = None;
        for offer in offers.iter().filter(|o| o.name == PERMESSAGE_DEFLATE) {
            match self.extension.negotiate(&offer.params) {
                Ok(response) => {
                    debug!(%response, "accepted extension offer");
                    return Ok(Some(response));
                }
                Err(err) => {
                    debug!(offer = %offer, error = %err, "declined extension offer");
                    last_error = Some(err);
                }
            }
        }
        last_error.map_or(Ok(None), Err)
    }

    /// Client side: apply the extensions the server agreed to.
    ///
    /// # Errors
    ///
    /// - `Error::ExtensionParseError` if the header is malformed
    /// - `Error::ExtensionsDisabled` if the server accepted an extension
    ///   this processor cannot run
    /// - `Error::InvalidAttributes` for an extension that was never offered
    /// - any error from the extension's own validation
    pub fn process_server_extensions(&mut self, response: &Response) -> Result<()> {
        let Some(value) = response.header(headers::SEC_WEBSOCKET_EXTENSIONS) else {
            return Ok(());
        };
        let accepted = ExtensionOffer::parse_header(value)?;
        if !self.extension.is_implemented() {
            return Err(Error::ExtensionsDisabled);
        }
        match accepted.as_slice() {
            [offer] if offer.name == PERMESSAGE_DEFLATE => self.extension.configure(&offer.params),
            _ => Err(Error::InvalidAttributes(format!(
                "unexpected extensions in response: {}",
                value
            ))),
        }
    }
}

#[cfg(feature = "compression")]
fn build_extension(role: Role, config: &Config) -> Box<dyn Extension> {
    use crate::extensions::deflate::PerMessageDeflate;

    match &config.deflate {
        Some(deflate) => Box::new(PerMessageDeflate::new(
            role,
            deflate.clone(),
            config.limits.max_message_size,
        )),
        None => Box::new(Disabled),
    }
}

#[cfg(not(feature = "compression"))]
fn build_extension(_role: Role, _config: &Config) -> Box<dyn Extension> {
    Box::new(Disabled)
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("extension", &self.extension)
            .field("bytes_needed", &self.bytes_needed())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
