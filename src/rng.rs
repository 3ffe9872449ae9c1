//! Randomness used for masking keys and handshake nonces.
//!
//! The processor never reaches for a global generator. The caller hands
//! it a [`RandomSource`] at construction, which keeps tests deterministic
//! and lets embedders plug in their own entropy.

use crate::error::{Error, Result};

/// Source of 32-bit random words.
pub trait RandomSource: Send {
    /// Produce the next random word.
    ///
    /// # Errors
    ///
    /// Returns `Error::Random` if no entropy is available.
    fn next_u32(&mut self) -> Result<u32>;

    /// Fill `dst` with random bytes, four at a time.
    ///
    /// # Errors
    ///
    /// Propagates any failure of [`next_u32`](Self::next_u32).
    fn fill_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        for chunk in dst.chunks_mut(4) {
            let word = self.next_u32()?.to_be_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(())
    }
}

/// Operating system entropy via `getrandom`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn next_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        getrandom::getrandom(&mut buf).map_err(|e| Error::Random(e.to_string()))?;
        Ok(u32::from_ne_bytes(buf))
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        getrandom::getrandom(dst).map_err(|e| Error::Random(e.to_string()))
    }
}

/// Any `FnMut() -> u32` closure is a random source, handy for tests.
impl<F> RandomSource for F
where
    F: FnMut() -> u32 + Send,
{
    fn next_u32(&mut self) -> Result<u32> {
        Ok(self())
    }
}
