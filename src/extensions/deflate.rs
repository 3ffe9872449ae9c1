//! permessage-deflate (RFC 7692).
//!
//! Negotiation follows the configured [`DeflateConfig`]. Once enabled the
//! extension keeps one raw DEFLATE compressor for outgoing messages and
//! one decompressor for incoming ones. Both are flushed with
//! `Z_SYNC_FLUSH`, whose `00 00 FF FF` tail is stripped on the wire and
//! restored before the last inflate of a message.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::debug;

use crate::config::{DeflateConfig, MAX_WINDOW_BITS, MIN_WINDOW_BITS};
use crate::error::{Error, Result};
use crate::extensions::{Extension, ExtensionParam, PERMESSAGE_DEFLATE};
use crate::role::Role;

const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// zlib refuses an 8-bit raw window and silently uses 9 instead; flate2
/// asserts on it, so ask for 9 up front.
const ZLIB_MIN_WINDOW_BITS: u8 = 9;

const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";
const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";

/// Parameters agreed during the handshake. Immutable once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// The server resets its compressor after every message.
    pub server_no_context_takeover: bool,
    /// The client resets its compressor after every message.
    pub client_no_context_takeover: bool,
    /// Server's LZ77 window.
    pub server_max_window_bits: u8,
    /// Client's LZ77 window.
    pub client_max_window_bits: u8,
}

impl Default for Negotiated {
    fn default() -> Self {
        Self {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: MAX_WINDOW_BITS,
            client_max_window_bits: MAX_WINDOW_BITS,
        }
    }
}

impl Negotiated {
    /// Header value announcing these parameters.
    fn response(&self, include_client_bits: bool) -> String {
        let mut out = String::from(PERMESSAGE_DEFLATE);
        if self.server_no_context_takeover {
            out.push_str("; ");
            out.push_str(SERVER_NO_CONTEXT_TAKEOVER);
        }
        if self.client_no_context_takeover {
            out.push_str("; ");
            out.push_str(CLIENT_NO_CONTEXT_TAKEOVER);
        }
        if self.server_max_window_bits < MAX_WINDOW_BITS {
            out.push_str(&format!("; {}={}", SERVER_MAX_WINDOW_BITS, self.server_max_window_bits));
        }
        if include_client_bits && self.client_max_window_bits < MAX_WINDOW_BITS {
            out.push_str(&format!("; {}={}", CLIENT_MAX_WINDOW_BITS, self.client_max_window_bits));
        }
        out
    }
}

/// Attributes of one offer or response, each seen at most once.
#[derive(Debug, Default)]
struct Attributes<'a> {
    server_no_context_takeover: bool,
    client_no_context_takeover: bool,
    server_max_window_bits: Option<Option<&'a str>>,
    client_max_window_bits: Option<Option<&'a str>>,
}

impl<'a> Attributes<'a> {
    /// Sort parameters into known attributes. Unknown or repeated names
    /// and flags carrying a value are rejected.
    fn collect(params: &'a [ExtensionParam]) -> Result<Self> {
        let mut attrs = Self::default();
        for param in params {
            let value = param.value.as_deref();
            let duplicate = match param.name.as_str() {
                SERVER_NO_CONTEXT_TAKEOVER | CLIENT_NO_CONTEXT_TAKEOVER if value.is_some() => {
                    return Err(Error::InvalidAttributeValue(param.name.clone()));
                }
                SERVER_NO_CONTEXT_TAKEOVER => {
                    std::mem::replace(&mut attrs.server_no_context_takeover, true)
                }
                CLIENT_NO_CONTEXT_TAKEOVER => {
                    std::mem::replace(&mut attrs.client_no_context_takeover, true)
                }
                SERVER_MAX_WINDOW_BITS => attrs.server_max_window_bits.replace(value).is_some(),
                CLIENT_MAX_WINDOW_BITS => attrs.client_max_window_bits.replace(value).is_some(),
                other => {
                    return Err(Error::InvalidAttributes(format!("unknown attribute {}", other)));
                }
            };
            if duplicate {
                return Err(Error::InvalidAttributes(format!("duplicate attribute {}", param.name)));
            }
        }
        Ok(attrs)
    }
}

/// Parse a window-bits value in 8..=15.
fn parse_window_bits(name: &str, value: Option<&str>) -> Result<u8> {
    value
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|bits| (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(bits))
        .ok_or_else(|| Error::InvalidAttributeValue(name.to_string()))
}

/// Live codec state after negotiation.
struct Codec {
    compress: Compress,
    decompress: Decompress,
    /// Reset the compressor after each outgoing message.
    reset_outgoing: bool,
    /// Reset the decompressor after each incoming message.
    reset_incoming: bool,
}

/// The permessage-deflate extension.
pub struct PerMessageDeflate {
    role: Role,
    config: DeflateConfig,
    negotiated: Option<Negotiated>,
    codec: Option<Codec>,
    scratch: Vec<u8>,
    max_output: usize,
}

impl PerMessageDeflate {
    /// Create an extension for `role`. Decompressed messages larger than
    /// `max_output` bytes are rejected.
    #[must_use]
    pub fn new(role: Role, config: DeflateConfig, max_output: usize) -> Self {
        let scratch = vec![0; config.buffer_size.max(1)];
        Self {
            role,
            config,
            negotiated: None,
            codec: None,
            scratch,
            max_output,
        }
    }

    /// Parameters in force, once negotiated.
    #[must_use]
    pub fn negotiated(&self) -> Option<&Negotiated> {
        self.negotiated.as_ref()
    }

    /// Window the client offers for its own compressor.
    fn offered_client_bits(&self) -> u8 {
        self.config.client_max_window_bits.max(ZLIB_MIN_WINDOW_BITS)
    }

    fn ensure_unconfigured(&self) -> Result<()> {
        if self.codec.is_some() {
            return Err(Error::InvalidAttributes("already negotiated".into()));
        }
        Ok(())
    }

    fn enable(&mut self, negotiated: Negotiated) {
        let (own_bits, reset_outgoing, reset_incoming) = match self.role {
            Role::Server => (
                negotiated.server_max_window_bits,
                negotiated.server_no_context_takeover,
                negotiated.client_no_context_takeover,
            ),
            Role::Client => (
                negotiated.client_max_window_bits,
                negotiated.client_no_context_takeover,
                negotiated.server_no_context_takeover,
            ),
        };
        let level = Compression::new(self.config.compression_level);
        let compress_bits = own_bits.max(ZLIB_MIN_WINDOW_BITS);
        self.codec = Some(Codec {
            compress: Compress::new_with_window_bits(level, false, compress_bits),
            // Any raw window up to 15 bits inflates with a 15-bit window.
            decompress: Decompress::new_with_window_bits(false, MAX_WINDOW_BITS),
            reset_outgoing,
            reset_incoming,
        });
        self.negotiated = Some(negotiated);
        debug!(role = %self.role, ?negotiated, "permessage-deflate enabled");
    }

    /// Run `input` through the decompressor, draining via the scratch buffer.
    fn inflate(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let codec = self.codec.as_mut().ok_or(Error::ExtensionNotEnabled)?;
        let scratch = self.scratch.as_mut_slice();
        loop {
            let before_in = codec.decompress.total_in();
            let before_out = codec.decompress.total_out();
            let status = codec
                .decompress
                .decompress(input, scratch, FlushDecompress::Sync)
                .map_err(|e| Error::Compression(e.to_string()))?;
            let consumed = (codec.decompress.total_in() - before_in) as usize;
            let produced = (codec.decompress.total_out() - before_out) as usize;

            out.extend_from_slice(&scratch[..produced]);
            if out.len() > self.max_output {
                return Err(Error::MessageTooBig {
                    size: out.len(),
                    max: self.max_output,
                });
            }
            input = &input[consumed..];

            let drained = input.is_empty() && produced < scratch.len();
            let stalled = consumed == 0 && produced == 0;
            if drained || stalled || status == Status::StreamEnd {
                return Ok(());
            }
        }
    }
}

impl Extension for PerMessageDeflate {
    fn name(&self) -> &str {
        PERMESSAGE_DEFLATE
    }

    fn is_implemented(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        self.codec.is_some()
    }

    fn generate_offer(&self) -> String {
        let mut offer = String::from(PERMESSAGE_DEFLATE);
        if self.config.server_no_context_takeover {
            offer.push_str("; ");
            offer.push_str(SERVER_NO_CONTEXT_TAKEOVER);
        }
        if self.config.client_no_context_takeover {
            offer.push_str("; ");
            offer.push_str(CLIENT_NO_CONTEXT_TAKEOVER);
        }
        if self.config.server_max_window_bits < MAX_WINDOW_BITS {
            offer.push_str(&format!(
                "; {}={}",
                SERVER_MAX_WINDOW_BITS, self.config.server_max_window_bits
            ));
        }
        let client_bits = self.offered_client_bits();
        if client_bits < MAX_WINDOW_BITS {
            offer.push_str(&format!("; {}={}", CLIENT_MAX_WINDOW_BITS, client_bits));
        } else {
            offer.push_str("; ");
            offer.push_str(CLIENT_MAX_WINDOW_BITS);
        }
        offer
    }

    fn negotiate(&mut self, params: &[ExtensionParam]) -> Result<String> {
        self.ensure_unconfigured()?;
        let attrs = Attributes::collect(params)?;
        let mut negotiated = Negotiated {
            server_no_context_takeover: attrs.server_no_context_takeover
                || self.config.server_no_context_takeover,
            client_no_context_takeover: attrs.client_no_context_takeover
                || self.config.client_no_context_takeover,
            ..Negotiated::default()
        };

        if let Some(value) = attrs.server_max_window_bits {
            let requested = parse_window_bits(SERVER_MAX_WINDOW_BITS, value)?;
            let bits = self
                .config
                .server_window_bits_mode
                .resolve(requested, self.config.server_max_window_bits);
            // The server compresses with this window, so it must be one zlib
            // can honor without exceeding the request.
            if bits < ZLIB_MIN_WINDOW_BITS && requested < ZLIB_MIN_WINDOW_BITS {
                return Err(Error::InvalidAttributeValue(SERVER_MAX_WINDOW_BITS.into()));
            }
            negotiated.server_max_window_bits = bits.max(ZLIB_MIN_WINDOW_BITS);
        }

        // A bare client_max_window_bits only says the client supports it.
        let client_offered = attrs.client_max_window_bits.is_some();
        if let Some(value) = attrs.client_max_window_bits {
            let requested = match value {
                None => MAX_WINDOW_BITS,
                Some(_) => parse_window_bits(CLIENT_MAX_WINDOW_BITS, value)?,
            };
            let bits = self
                .config
                .client_window_bits_mode
                .resolve(requested, self.config.client_max_window_bits);
            // An explicit 8 from the client is its own choice; never impose one.
            negotiated.client_max_window_bits = if requested < ZLIB_MIN_WINDOW_BITS {
                bits
            } else {
                bits.max(ZLIB_MIN_WINDOW_BITS)
            };
        }

        let response = negotiated.response(client_offered);
        self.enable(negotiated);
        Ok(response)
    }

    fn configure(&mut self, params: &[ExtensionParam]) -> Result<()> {
        self.ensure_unconfigured()?;
        let attrs = Attributes::collect(params)?;
        let mut negotiated = Negotiated {
            server_no_context_takeover: attrs.server_no_context_takeover,
            client_no_context_takeover: attrs.client_no_context_takeover,
            ..Negotiated::default()
        };

        // The server may narrow either window but never widen what was offered.
        if let Some(value) = attrs.server_max_window_bits {
            let bits = parse_window_bits(SERVER_MAX_WINDOW_BITS, value)?;
            if bits > self.config.server_max_window_bits {
                return Err(Error::InvalidAttributeValue(SERVER_MAX_WINDOW_BITS.into()));
            }
            negotiated.server_max_window_bits = bits;
        }
        if let Some(value) = attrs.client_max_window_bits {
            let bits = parse_window_bits(CLIENT_MAX_WINDOW_BITS, value)?;
            if bits > self.offered_client_bits() || bits < ZLIB_MIN_WINDOW_BITS {
                return Err(Error::InvalidAttributeValue(CLIENT_MAX_WINDOW_BITS.into()));
            }
            negotiated.client_max_window_bits = bits;
        }
        self.enable(negotiated);
        Ok(())
    }

    fn compress(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let codec = self.codec.as_mut().ok_or(Error::ExtensionNotEnabled)?;
        let scratch = self.scratch.as_mut_slice();
        let start = out.len();
        loop {
            let before_in = codec.compress.total_in();
            let before_out = codec.compress.total_out();
            let status = codec
                .compress
                .compress(input, scratch, FlushCompress::Sync)
                .map_err(|e| Error::Compression(e.to_string()))?;
            let consumed = (codec.compress.total_in() - before_in) as usize;
            let produced = (codec.compress.total_out() - before_out) as usize;

            out.extend_from_slice(&scratch[..produced]);
            input = &input[consumed..];

            // Sync flush is complete once zlib leaves output space unused.
            let flushed = input.is_empty() && produced < scratch.len();
            if flushed || status == Status::BufError {
                break;
            }
        }

        if out.len() - start >= DEFLATE_TRAILER.len() && out.ends_with(&DEFLATE_TRAILER) {
            out.truncate(out.len() - DEFLATE_TRAILER.len());
        }
        if codec.reset_outgoing {
            codec.compress.reset();
        }
        Ok(())
    }

    fn decompress(&mut self, input: &[u8], fin: bool, out: &mut Vec<u8>) -> Result<()> {
        self.inflate(input, out)?;
        if fin {
            self.inflate(&DEFLATE_TRAILER, out)?;
            if self.codec.as_ref().is_some_and(|c| c.reset_incoming) {
                self.reset_decompress_context();
            }
        }
        Ok(())
    }

    fn reset_compress_context(&mut self) {
        if let Some(codec) = self.codec.as_mut() {
            codec.compress.reset();
        }
    }

    fn reset_decompress_context(&mut self) {
        if let Some(codec) = self.codec.as_mut() {
            codec.decompress.reset(false);
        }
    }
}
