//! Fixed-size bitmap with one bit per tree node.

use alloc::{boxed::Box, vec};
use core::mem;

/// A bit-per-node status map, sized once at construction.
///
/// A set bit means the node is checked out or has been split; a clear bit
/// means the node is a whole, free block (or has never been materialized).
pub(crate) struct Bitmap {
    num_bits: usize,
    map: Box<[u64]>,
}

impl Bitmap {
    /// Constructs a zeroed bitmap of `num_bits` bits.
    pub fn new(num_bits: usize) -> Bitmap {
        assert!(num_bits > 0);

        let num_words = num_bits.div_ceil(u64::BITS as usize);

        Bitmap {
            num_bits,
            map: vec![0; num_words].into_boxed_slice(),
        }
    }

    /// Returns a tuple of the index of the `u64` containing `bit` and a mask
    /// which extracts it.
    #[inline]
    const fn index_and_mask(bit: usize) -> (usize, u64) {
        (
            bit / u64::BITS as usize,
            1 << (bit as u64 % u64::BITS as u64),
        )
    }

    /// Gets the value of the indexed bit.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.num_bits);

        let (word_idx, mask) = Self::index_and_mask(index);

        self.map[word_idx] & mask != 0
    }

    /// Sets the value of the indexed bit.
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.num_bits);

        let (word_idx, mask) = Self::index_and_mask(index);

        match value {
            true => self.map[word_idx] |= mask,
            false => self.map[word_idx] &= !mask,
        }
    }

    /// Size of the backing storage in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.map.len() * mem::size_of::<u64>()
    }
}
