//! `validated_once_bitmap`: a set-only, word-level-atomic bit set recording
//! which data blocks have ever passed a full verification (spec §3, §4.E.1,
//! "check_at_most_once"). Concurrent setters never clear a bit, so a torn
//! read only ever under-reports (falls back to full verification), never
//! over-reports.

use std::sync::atomic::{AtomicU64, Ordering};

const BITS_PER_WORD: u64 = 64;

/// A concurrently-settable, never-cleared bitmap with one bit per data
/// block. Bulk-allocated once at construction (spec §5, "Memory
/// discipline").
pub struct ValidatedOnceBitmap {
    words: Vec<AtomicU64>,
}

impl ValidatedOnceBitmap {
    /// `len` is the number of data blocks to track. Mirrors
    /// `verity_alloc_most_once`'s `data_blocks > INT_MAX` guard: the caller
    /// is expected to have already checked `len <= i32::MAX as u64`.
    pub fn new(len: u64) -> Self {
        let words = len.div_ceil(BITS_PER_WORD);
        Self { words: (0..words).map(|_| AtomicU64::new(0)).collect() }
    }

    #[inline]
    pub fn is_set(&self, bit: u64) -> bool {
        let (word, mask) = Self::locate(bit);
        (self.words[word].load(Ordering::Relaxed) & mask) != 0
    }

    #[inline]
    pub fn set(&self, bit: u64) {
        let (word, mask) = Self::locate(bit);
        self.words[word].fetch_or(mask, Ordering::Relaxed);
    }

    #[inline]
    fn locate(bit: u64) -> (usize, u64) {
        ((bit / BITS_PER_WORD) as usize, 1u64 << (bit % BITS_PER_WORD))
    }
}
