//! Incremental UTF-8 validation for text messages.
//!
//! Text payloads arrive in arbitrary pieces: fragments, and within a
//! fragment whatever a single read delivered. The validator keeps the
//! bytes of a partially received code point between calls.

use crate::error::{Error, Result};

/// Streaming UTF-8 validator.
///
/// Rejects input at the first byte that cannot continue a valid UTF-8
/// prefix. [`is_complete`](Self::is_complete) tells whether everything
/// seen so far ends on a code point boundary.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    /// Leading bytes of an unfinished code point.
    incomplete: [u8; 4],
    /// Number of bytes in `incomplete`.
    incomplete_len: usize,
}

/// Encoded width announced by a leading byte, or `None` if it cannot
/// start a code point.
const fn sequence_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

impl Utf8Validator {
    /// Create a validator positioned on a code point boundary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next piece of the byte stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` as soon as the stream can no longer be
    /// valid UTF-8. The validator should be discarded afterwards.
    pub fn validate(&mut self, mut data: &[u8]) -> Result<()> {
        if self.incomplete_len > 0 {
            data = self.finish_pending(data)?;
        }
        if data.is_empty() {
            return Ok(());
        }

        match std::str::from_utf8(data) {
            Ok(_) => Ok(()),
            // error_len() is None only for a truncated sequence at the end.
            Err(e) if e.error_len().is_none() => {
                let tail = &data[e.valid_up_to()..];
                self.incomplete[..tail.len()].copy_from_slice(tail);
                self.incomplete_len = tail.len();
                Ok(())
            }
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    /// Complete the pending code point from the front of `data` and return
    /// whatever follows it.
    fn finish_pending<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8]> {
        let width = sequence_width(self.incomplete[0]).ok_or(Error::InvalidUtf8)?;
        let needed = width - self.incomplete_len;
        let take = needed.min(data.len());

        let start = self.incomplete_len;
        self.incomplete[start..start + take].copy_from_slice(&data[..take]);
        self.incomplete_len += take;

        match std::str::from_utf8(&self.incomplete[..self.incomplete_len]) {
            Ok(_) => {
                self.incomplete_len = 0;
                Ok(&data[take..])
            }
            Err(e) if e.error_len().is_none() && take < needed => Ok(&[]),
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    /// `true` if the bytes seen so far end on a code point boundary.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.incomplete_len == 0
    }

    /// Discard any partial code point.
    pub fn reset(&mut self) {
        self.incomplete_len = 0;
    }
}

/// Validate a complete (non-fragmented) payload.
///
/// # Errors
///
/// Returns `Error::InvalidUtf8` if the data is not valid UTF-8.
pub fn validate_utf8(data: &[u8]) -> Result<()> {
    std::str::from_utf8(data)
        .map(|_| ())
        .map_err(|_| Error::InvalidUtf8)
}
