//! Payload masking (RFC 6455 Section 5.3).
//!
//! Masking is `out[i] = in[i] ^ key[i % 4]`. A payload may arrive split
//! across many reads, so [`MaskingKey`] remembers how far into the key the
//! previous chunk ended and continues from there.

/// Byte-by-byte XOR masking. Reference implementation.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// XOR masking processing four bytes at a time.
///
/// Produces the same output as [`apply_mask`].
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);

    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }

    for (byte, m) in chunks.into_remainder().iter_mut().zip(mask) {
        *byte ^= m;
    }
}

/// Masking key whose position carries over between calls.
///
/// Masking `N` bytes in one call or in several calls summing to `N` bytes
/// yields identical output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskingKey {
    key: [u8; 4],
    offset: usize,
}

impl MaskingKey {
    /// Create a key positioned at its first byte.
    #[must_use]
    pub const fn new(key: [u8; 4]) -> Self {
        Self { key, offset: 0 }
    }

    /// The original 4-byte key.
    #[must_use]
    pub const fn key(&self) -> [u8; 4] {
        self.key
    }

    /// Index into the key of the next byte to be masked.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Key rotated so that index 0 lines up with the next payload byte.
    #[must_use]
    pub fn prepared(&self) -> [u8; 4] {
        let mut rotated = self.key;
        rotated.rotate_left(self.offset);
        rotated
    }

    /// Mask (or unmask) `data` in place and advance the key position.
    pub fn apply(&mut self, data: &mut [u8]) {
        if data.is_empty() {
            return;
        }
        apply_mask_fast(data, self.prepared());
        self.offset = (self.offset + data.len()) % 4;
    }

    /// Rewind to the first key byte.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_reversible() {
        let mask = [0x12, 0x34, 0x56, 0x78];
        let original = b"Hello, WebSocket!".to_vec();
        let mut data = original.clone();

        apply_mask(&mut data, mask);
        assert_ne!(data, original);

        apply_mask(&mut data, mask);
        assert_eq!(data, original);
    }

    #[test]
    fn test_masking_example_from_rfc() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = b"Hello".to_vec();

        apply_mask(&mut data, mask);
        assert_eq!(data, vec![0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_masking_empty() {
        let mut data: Vec<u8> = vec![];
        apply_mask_fast(&mut data, [0x12, 0x34, 0x56, 0x78]);
        assert!(data.is_empty());
    }

    #[test]
    fn test_masking_fast_equivalent() {
        let mask = [0xab, 0xcd, 0xef, 0x12];
        for size in [0, 1, 2, 3, 4, 5, 7, 8, 15, 16, 17, 31, 32, 33, 127, 1000, 4096] {
            let original: Vec<u8> = (0..size).map(|i| (i & 0xff) as u8).collect();

            let mut scalar = original.clone();
            let mut fast = original.clone();
            apply_mask(&mut scalar, mask);
            apply_mask_fast(&mut fast, mask);

            assert_eq!(scalar, fast, "mismatch at size {}", size);
        }
    }

    #[test]
    fn test_masking_key_prepared_rotation() {
        let mut key = MaskingKey::new([1, 2, 3, 4]);
        assert_eq!(key.prepared(), [1, 2, 3, 4]);

        let mut three = [0u8; 3];
        key.apply(&mut three);
        assert_eq!(three, [1, 2, 3]);
        assert_eq!(key.offset(), 3);
        assert_eq!(key.prepared(), [4, 1, 2, 3]);

        key.reset();
        assert_eq!(key.offset(), 0);
        assert_eq!(key.key(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_masking_key_split_matches_single_pass() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let original: Vec<u8> = (0..97u8).collect();

        let mut whole = original.clone();
        apply_mask(&mut whole, mask);

        for split in [1usize, 2, 3, 5, 7, 13] {
            let mut pieces = original.clone();
            let mut key = MaskingKey::new(mask);
            for chunk in pieces.chunks_mut(split) {
                key.apply(chunk);
            }
            assert_eq!(pieces, whole, "split size {}", split);
        }
    }
}
