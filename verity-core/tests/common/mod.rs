//! Shared fixtures for the end-to-end integration tests: an in-memory hash
//! volume and data device, an inline worker pool, and a from-scratch hash
//! tree builder so each scenario can corrupt the data device independently
//! of the tree it was built over.

use verity_cache::HashBlockSource;
use verity_core::dispatch::DataDevice;
use verity_core::geometry::Geometry;
use verity_core::host::WorkerPool;
use verity_hashes::{DigestAlgorithm, FormatVersion};

pub struct MemSource(pub Vec<Vec<u8>>);
impl HashBlockSource for MemSource {
    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> std::io::Result<()> {
        buf.copy_from_slice(&self.0[block_id as usize]);
        Ok(())
    }
    fn size_in_blocks(&self) -> u64 {
        self.0.len() as u64
    }
}

pub struct MemDevice {
    pub blocks: Vec<Vec<u8>>,
    pub block_size: usize,
}
impl DataDevice for MemDevice {
    fn submit_read(&self, start_block: u64, mut buf: Vec<u8>, on_complete: Box<dyn FnOnce(std::io::Result<Vec<u8>>) + Send>) {
        let count = buf.len() / self.block_size;
        for i in 0..count {
            let block = (start_block as usize) + i;
            buf[i * self.block_size..(i + 1) * self.block_size].copy_from_slice(&self.blocks[block]);
        }
        on_complete(Ok(buf));
    }
}

/// Runs spawned work inline, on the caller's thread.
pub struct InlinePool;
impl WorkerPool for InlinePool {
    fn spawn(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// Build a complete hash tree over `data`, returning the flat hash-block
/// table (ready for a [`MemSource`]), the root digest, and the geometry it
/// was built against.
///
/// Places each level's digests by exploiting the fact that
/// `Geometry::hash_block_of`/`offset_in_hash_block` are pure functions of a
/// block index and level: for a block at level `L` with local index `c`
/// within that level's span, `c << (L * hashes_per_block_bits)` is a valid
/// stand-in block index whose `position_at_level(_, L)` equals `c`, which is
/// exactly the slot its digest occupies in level `L + 1`.
pub fn build_hash_tree(
    data: &[Vec<u8>],
    algorithm: &dyn DigestAlgorithm,
    salt: &[u8],
    version: FormatVersion,
    data_block_bits: u32,
    hash_block_bits: u32,
) -> (Vec<Vec<u8>>, Vec<u8>, Geometry) {
    let digest_size = algorithm.digest_size();
    // hash_volume_size_blocks is only used to assert the tree fits; a
    // generous upper bound lets us compute the real geometry in one pass.
    let geometry = Geometry::new(data_block_bits, hash_block_bits, digest_size, data.len() as u64, 0, version, 1u64 << 48).unwrap();

    let total_hash_blocks = geometry.level_base[geometry.levels as usize - 1] + 1;
    let hash_block_size = geometry.hash_block_size();
    let mut hash_blocks = vec![vec![0u8; hash_block_size]; total_hash_blocks as usize];

    for (i, block) in data.iter().enumerate() {
        let i = i as u64;
        let mut digest = vec![0u8; digest_size];
        verity_hashes::hash(algorithm, salt, version, block, &mut digest).unwrap();
        let hb = geometry.hash_block_of(i, 0) as usize;
        let off = geometry.offset_in_hash_block(i, 0);
        hash_blocks[hb][off..off + digest_size].copy_from_slice(&digest);
    }

    for level in 1..geometry.levels {
        let span = geometry.level_base[level as usize - 1]..geometry.level_base[level as usize];
        for (c, hb_idx) in span.enumerate() {
            let mut digest = vec![0u8; digest_size];
            verity_hashes::hash(algorithm, salt, version, &hash_blocks[hb_idx as usize], &mut digest).unwrap();
            let fake_block = (c as u64) << (level * geometry.hashes_per_block_bits);
            let target_hb = geometry.hash_block_of(fake_block, level) as usize;
            let target_off = geometry.offset_in_hash_block(fake_block, level);
            hash_blocks[target_hb][target_off..target_off + digest_size].copy_from_slice(&digest);
        }
    }

    let top_block = &hash_blocks[geometry.level_base[geometry.levels as usize - 1] as usize];
    let mut root_digest = vec![0u8; digest_size];
    verity_hashes::hash(algorithm, salt, version, top_block, &mut root_digest).unwrap();

    (hash_blocks, root_digest, geometry)
}
