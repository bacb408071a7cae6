//! Geometry & addressing (component A).
//!
//! Pure, side-effect free, constant-time address arithmetic: given a data
//! block index and a tree level, compute the hash-block index on the hash
//! volume and the byte offset of that block's digest within the hash block.
//! Everything here is immutable once constructed.

use verity_hashes::FormatVersion;

const MAX_LEVELS: u32 = 63;

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("data block size and hash block size must be powers of two")]
    NotPowerOfTwo,
    #[error("digest size {digest_size} too large for hash block size {hash_block_size}")]
    DigestTooLarge { digest_size: usize, hash_block_size: usize },
    #[error("data_blocks must be at least 1")]
    NoDataBlocks,
    #[error("hash tree requires {levels} levels, exceeding the maximum of {max}")]
    TooManyLevels { levels: u32, max: u32 },
    #[error("root digest length {actual} does not match algorithm digest size {expected}")]
    RootDigestLength { actual: usize, expected: usize },
    #[error("salt length {0} exceeds the maximum of 256 bytes")]
    SaltTooLong(usize),
    #[error("level {level} overlaps the next level's base")]
    OverlappingLevels { level: u32 },
    #[error("level {level} extends past the end of the hash volume")]
    LevelExceedsVolume { level: u32 },
}

/// Immutable hash-tree geometry, computed once at construction time from the
/// construction parameters and never mutated afterward.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub data_block_bits: u32,
    pub hash_block_bits: u32,
    pub digest_size: usize,
    pub hashes_per_block_bits: u32,
    pub data_blocks: u64,
    pub levels: u32,
    pub level_base: Vec<u64>,
    pub version: FormatVersion,
}

impl Geometry {
    /// `hash_volume_size_blocks` is the total number of hash blocks
    /// available on the hash volume, used only to assert level ranges fit.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data_block_bits: u32,
        hash_block_bits: u32,
        digest_size: usize,
        data_blocks: u64,
        hash_start_block: u64,
        version: FormatVersion,
        hash_volume_size_blocks: u64,
    ) -> Result<Self, GeometryError> {
        if data_blocks == 0 {
            return Err(GeometryError::NoDataBlocks);
        }
        if (1usize << hash_block_bits) < digest_size.checked_mul(2).unwrap_or(usize::MAX) {
            return Err(GeometryError::DigestTooLarge { digest_size, hash_block_size: 1 << hash_block_bits });
        }

        let hash_block_size = 1usize << hash_block_bits;
        let max_per_block = hash_block_size / digest_size;
        let hashes_per_block_bits = floor_log2(max_per_block as u64);

        let mut levels: u32 = 0;
        while hashes_per_block_bits.saturating_mul(levels) < 64 && ((data_blocks - 1) >> (hashes_per_block_bits * levels)) != 0 {
            levels += 1;
        }
        if levels == 0 {
            // A single data block still needs one level: the root block
            // covers the lone leaf (spec §8 boundary behavior).
            levels = 1;
        }
        if levels > MAX_LEVELS {
            return Err(GeometryError::TooManyLevels { levels, max: MAX_LEVELS });
        }
        if hashes_per_block_bits.saturating_mul(levels) >= 64 {
            return Err(GeometryError::TooManyLevels { levels, max: MAX_LEVELS });
        }

        // Compute level bases bottom-up so level 0 sits closest to the data
        // and the root (level `levels - 1`) lands last, matching the
        // dm-verity layout.
        let mut level_base = vec![0u64; levels as usize];
        let mut hash_position = hash_start_block;
        for i in 0..levels {
            level_base[i as usize] = hash_position;
            let shift = (i + 1) * hashes_per_block_bits;
            let span = (data_blocks + (1u64 << shift) - 1) >> shift;
            hash_position = hash_position.checked_add(span).ok_or(GeometryError::LevelExceedsVolume { level: i })?;
        }
        let hash_blocks_total = hash_position;
        if hash_blocks_total > hash_volume_size_blocks {
            return Err(GeometryError::LevelExceedsVolume { level: levels - 1 });
        }
        for i in 0..levels.saturating_sub(1) {
            if level_base[i as usize] >= level_base[i as usize + 1] {
                return Err(GeometryError::OverlappingLevels { level: i });
            }
        }

        Ok(Self { data_block_bits, hash_block_bits, digest_size, hashes_per_block_bits, data_blocks, levels, level_base, version })
    }

    pub fn hash_block_size(&self) -> usize {
        1 << self.hash_block_bits
    }

    pub fn data_block_size(&self) -> usize {
        1 << self.data_block_bits
    }

    #[inline]
    pub fn position_at_level(&self, block: u64, level: u32) -> u64 {
        block >> (level * self.hashes_per_block_bits)
    }

    #[inline]
    pub fn hash_block_of(&self, block: u64, level: u32) -> u64 {
        self.level_base[level as usize] + (self.position_at_level(block, level) >> self.hashes_per_block_bits)
    }

    #[inline]
    pub fn offset_in_hash_block(&self, block: u64, level: u32) -> usize {
        let idx = self.position_at_level(block, level) & ((1u64 << self.hashes_per_block_bits) - 1);
        match self.version {
            FormatVersion::V0 => (idx as usize) * self.digest_size,
            FormatVersion::V1 => (idx << (self.hash_block_bits - self.hashes_per_block_bits)) as usize,
        }
    }
}

/// Largest power of two `<= n`, as a shift amount (`n.ilog2()` for `n > 0`).
fn floor_log2(n: u64) -> u32 {
    debug_assert!(n > 0);
    63 - n.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom(data_blocks: u64) -> Geometry {
        Geometry::new(12, 12, 32, data_blocks, 0, FormatVersion::V1, 1 << 40).unwrap()
    }

    #[test]
    fn single_data_block_has_one_level() {
        let g = geom(1);
        assert_eq!(g.levels, 1);
    }

    #[test]
    fn hash_block_of_stays_within_level_range() {
        let g = geom(100_000);
        for level in 0..g.levels {
            let span_blocks = if level + 1 < g.levels { g.level_base[level as usize + 1] - g.level_base[level as usize] } else { 1 };
            for b in [0u64, 1, g.data_blocks / 2, g.data_blocks - 1] {
                let hb = g.hash_block_of(b, level);
                assert!(hb >= g.level_base[level as usize]);
                assert!(hb < g.level_base[level as usize] + span_blocks.max(1) + 1);
            }
        }
    }

    #[test]
    fn offset_v0_is_index_times_digest_size() {
        let g = Geometry::new(12, 12, 32, 1000, 0, FormatVersion::V0, 1 << 40).unwrap();
        assert_eq!(g.offset_in_hash_block(0, 0), 0);
        assert_eq!(g.offset_in_hash_block(1, 0), 32);
    }

    #[test]
    fn offset_v1_pads_to_power_of_two_slot() {
        let g = Geometry::new(12, 12, 32, 1000, 0, FormatVersion::V1, 1 << 40).unwrap();
        // hash_block_bits=12, hashes_per_block_bits=7 (4096/32=128=2^7)
        assert_eq!(g.offset_in_hash_block(0, 0), 0);
        assert_eq!(g.offset_in_hash_block(1, 0), 1 << (12 - 7));
    }

    #[test]
    fn rejects_digest_too_large_for_hash_block() {
        let err = Geometry::new(12, 6, 64, 1000, 0, FormatVersion::V1, 1 << 40).unwrap_err();
        assert!(matches!(err, GeometryError::DigestTooLarge { .. }));
    }

    #[test]
    fn levels_increase_with_data_block_count() {
        let small = geom(2);
        let large = geom(1 << 20);
        assert!(large.levels >= small.levels);
    }
}
