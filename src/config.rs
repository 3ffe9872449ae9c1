//! Configuration and limits for the protocol processor.

use crate::error::{Error, Result};

/// Smallest LZ77 window permessage-deflate can negotiate.
pub const MIN_WINDOW_BITS: u8 = 8;
/// Largest LZ77 window, also the protocol default.
pub const MAX_WINDOW_BITS: u8 = 15;

/// Resource limits applied while assembling incoming messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a complete message in bytes.
    ///
    /// Applies to the sum of all fragments, and to the decompressed
    /// payload when permessage-deflate is in use.
    ///
    /// Default: 32 000 000
    pub max_message_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_size: 32_000_000,
        }
    }
}

impl Limits {
    /// Create limits with a custom message size.
    #[must_use]
    pub const fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Limits suitable for small embedded systems (256 KB messages).
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_message_size: 256 * 1024,
        }
    }

    /// Limits for trusted peers only.
    ///
    /// 4 GB on 64-bit targets, `usize::MAX` elsewhere.
    #[cfg(target_pointer_width = "64")]
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            max_message_size: 4 * 1024 * 1024 * 1024,
        }
    }

    /// Limits for trusted peers only.
    ///
    /// 4 GB on 64-bit targets, `usize::MAX` elsewhere.
    #[cfg(not(target_pointer_width = "64"))]
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            max_message_size: usize::MAX,
        }
    }

    /// Validate that a message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooBig`] if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            Err(Error::MessageTooBig {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }
}

/// How to answer a peer's `*_max_window_bits` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowBitsMode {
    /// Use whatever the peer asked for.
    Accept,
    /// Ignore the request and keep the default of 15.
    Decline,
    /// The larger window: the smaller of the request and the local value.
    #[default]
    Largest,
    /// Always the smallest window (8). A window this crate compresses
    /// with is raised to 9, the least zlib supports.
    Smallest,
}

impl WindowBitsMode {
    /// Settle on a window size given the peer's request and the local
    /// preference.
    #[must_use]
    pub fn resolve(self, requested: u8, local: u8) -> u8 {
        match self {
            WindowBitsMode::Accept => requested,
            WindowBitsMode::Decline => MAX_WINDOW_BITS,
            WindowBitsMode::Largest => requested.min(local),
            WindowBitsMode::Smallest => MIN_WINDOW_BITS,
        }
    }
}

/// permessage-deflate settings (RFC 7692).
///
/// On a client these shape the offer; on a server they decide how offers
/// are answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateConfig {
    /// Ask (client) or require (server) that the server resets its
    /// compression context after every message.
    pub server_no_context_takeover: bool,
    /// Ask (client) or require (server) that the client resets its
    /// compression context after every message.
    pub client_no_context_takeover: bool,
    /// Preferred server window size.
    pub server_max_window_bits: u8,
    /// Answer policy for `server_max_window_bits`.
    pub server_window_bits_mode: WindowBitsMode,
    /// Preferred client window size.
    pub client_max_window_bits: u8,
    /// Answer policy for `client_max_window_bits`.
    pub client_window_bits_mode: WindowBitsMode,
    /// zlib compression level, 0-9.
    pub compression_level: u32,
    /// Size of the scratch buffer codec output is drained through.
    pub buffer_size: usize,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: MAX_WINDOW_BITS,
            server_window_bits_mode: WindowBitsMode::Largest,
            client_max_window_bits: MAX_WINDOW_BITS,
            client_window_bits_mode: WindowBitsMode::Largest,
            compression_level: 6,
            buffer_size: 16 * 1024,
        }
    }
}

impl DeflateConfig {
    /// Default settings: context takeover in both directions, 15-bit windows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `server_no_context_takeover`.
    #[must_use]
    pub const fn server_no_context_takeover(mut self, value: bool) -> Self {
        self.server_no_context_takeover = value;
        self
    }

    /// Set `client_no_context_takeover`.
    #[must_use]
    pub const fn client_no_context_takeover(mut self, value: bool) -> Self {
        self.client_no_context_takeover = value;
        self
    }

    /// Set the preferred server window and its answer policy.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAttributeValue` unless `bits` is in 8..=15.
    pub fn server_max_window_bits(mut self, bits: u8, mode: WindowBitsMode) -> Result<Self> {
        check_window_bits("server_max_window_bits", bits)?;
        self.server_max_window_bits = bits;
        self.server_window_bits_mode = mode;
        Ok(self)
    }

    /// Set the preferred client window and its answer policy.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAttributeValue` unless `bits` is in 8..=15.
    pub fn client_max_window_bits(mut self, bits: u8, mode: WindowBitsMode) -> Result<Self> {
        check_window_bits("client_max_window_bits", bits)?;
        self.client_max_window_bits = bits;
        self.client_window_bits_mode = mode;
        Ok(self)
    }

    /// Set the zlib compression level.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAttributeValue` if `level` is above 9.
    pub fn compression_level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidAttributeValue(format!(
                "compression_level must be 0-9, got {}",
                level
            )));
        }
        self.compression_level = level;
        Ok(self)
    }

    /// Set the scratch buffer size. Zero is raised to one byte.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }
}

fn check_window_bits(name: &str, bits: u8) -> Result<()> {
    if (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
        Ok(())
    } else {
        Err(Error::InvalidAttributeValue(format!(
            "{} must be {}-{}, got {}",
            name, MIN_WINDOW_BITS, MAX_WINDOW_BITS, bits
        )))
    }
}

/// Processor configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// permessage-deflate settings. `None` disables the extension.
    ///
    /// Ignored when the crate is built without the `compression` feature.
    pub deflate: Option<DeflateConfig>,
}

impl Config {
    /// Default limits, no extensions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Shorthand for replacing the message size limit.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.limits.max_message_size = size;
        self
    }

    /// Enable permessage-deflate with the given settings.
    #[must_use]
    pub fn with_deflate(mut self, deflate: DeflateConfig) -> Self {
        self.deflate = Some(deflate);
        self
    }

    /// Disable permessage-deflate.
    #[must_use]
    pub fn without_deflate(mut self) -> Self {
        self.deflate = None;
        self
    }

    /// Typical server: default limits, answers permessage-deflate offers.
    #[must_use]
    pub fn server() -> Self {
        Self::new().with_deflate(DeflateConfig::default())
    }

    /// Typical client: default limits, offers permessage-deflate.
    #[must_use]
    pub fn client() -> Self {
        Self::new().with_deflate(DeflateConfig::default())
    }
}
