//! Prefetcher (component H): opportunistically warms the hash-block cache
//! for a pending verification, widening the lowest level to a configured
//! cluster boundary.
//!
//! Grounded directly on `verity_prefetch_io` in
//! `examples/original_source/drivers/md/dm-verity-target.c`. The root hash
//! block is never prefetched (assumed hot); prefetch failures are advisory
//! and swallowed by the cache adapter itself (`HashBlockCache::prefetch`).

use verity_cache::HashBlockSource;

use crate::tunables::prefetch_cluster_bytes;
use crate::verify::Verifier;

/// A prefetch task as described in spec §3: owned by the prefetch worker
/// queue, destroyed once processed. Plain data — `run` below does the work.
pub struct PrefetchTask {
    pub start_block: u64,
    pub block_count: u64,
}

/// Run one prefetch task against `v`'s hash-block cache, using the current
/// process-wide `prefetch_cluster` tunable.
pub fn run<S: HashBlockSource>(v: &Verifier<S>, task: &PrefetchTask) {
    run_with_cluster_bytes(v, task, prefetch_cluster_bytes());
}

/// Same as [`run`], but with the cluster size passed explicitly rather than
/// read from the global tunable — used directly by tests so they don't race
/// other tests over shared process-global state.
pub fn run_with_cluster_bytes<S: HashBlockSource>(v: &Verifier<S>, task: &PrefetchTask, cluster_bytes: u32) {
    if task.block_count == 0 {
        return;
    }
    let last_block = task.start_block + task.block_count - 1;
    let levels = v.geometry.levels;

    // `levels - 2` downto `0`; skips entirely when `levels <= 1` (the root
    // level covers the whole tree and is assumed hot).
    let Some(top) = levels.checked_sub(2) else { return };

    for level in (0..=top).rev() {
        let mut hb_lo = v.geometry.hash_block_of(task.start_block, level);
        let mut hb_hi = v.geometry.hash_block_of(last_block, level);

        if level == 0 {
            round_to_cluster(&mut hb_lo, &mut hb_hi, cluster_bytes, v.geometry.data_block_bits, v.cache.size_in_blocks());
        }

        v.cache.prefetch(hb_lo, hb_hi - hb_lo + 1);
    }
}

/// Rounds `[hb_lo, hb_hi]` outward to the configured prefetch cluster's
/// power-of-two boundary, clipped to `[0, size_in_blocks - 1]`. Leaves the
/// range untouched when the cluster setting is 0 (spec §9, "Prefetch
/// cluster rounding").
fn round_to_cluster(hb_lo: &mut u64, hb_hi: &mut u64, cluster_bytes: u32, data_block_bits: u32, size_in_blocks: u64) -> bool {
    let mut cluster = (cluster_bytes as u64) >> data_block_bits;
    if cluster == 0 {
        return false;
    }
    if !cluster.is_power_of_two() {
        cluster = 1u64 << floor_log2(cluster);
    }
    *hb_lo &= !(cluster - 1);
    *hb_hi |= cluster - 1;
    if size_in_blocks > 0 && *hb_hi >= size_in_blocks {
        *hb_hi = size_in_blocks - 1;
    }
    true
}

fn floor_log2(n: u64) -> u32 {
    debug_assert!(n > 0);
    63 - n.leading_zeros()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use verity_cache::HashBlockCache;
    use verity_hashes::{FormatVersion, Sha256Algorithm};

    use crate::fec::NoFec;
    use crate::geometry::Geometry;
    use crate::host::{NullHostEvents, NullHostHalt};
    use crate::policy::{Mode, PolicyEngine};

    use super::*;

    struct CountingSource {
        blocks: usize,
    }
    impl HashBlockSource for CountingSource {
        fn read_block(&self, block_id: u64, buf: &mut [u8]) -> std::io::Result<()> {
            if block_id as usize >= self.blocks {
                return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "oob"));
            }
            buf.fill(0);
            Ok(())
        }
        fn size_in_blocks(&self) -> u64 {
            self.blocks as u64
        }
    }

    fn verifier(data_blocks: u64, hash_blocks: usize) -> Verifier<CountingSource> {
        let geometry = Geometry::new(12, 12, 32, data_blocks, 0, FormatVersion::V1, hash_blocks as u64).unwrap();
        let cache = HashBlockCache::new(CountingSource { blocks: hash_blocks }, 4096, None);
        Verifier {
            geometry,
            cache,
            algorithm: Box::new(Sha256Algorithm),
            salt: Vec::new(),
            root_digest: vec![0u8; 32],
            zero_digest: None,
            validated_once: None,
            policy: PolicyEngine::new(Mode::Eio, "testdev", Arc::new(NullHostEvents), Arc::new(NullHostHalt)),
            fec: Arc::new(NoFec),
            device_name: "testdev".into(),
        }
    }

    #[test]
    fn single_level_tree_never_prefetches_the_root() {
        let v = verifier(4, 1);
        let reads_before = v.cache.total_reads();
        run_with_cluster_bytes(&v, &PrefetchTask { start_block: 0, block_count: 4 }, 4096);
        assert_eq!(v.cache.total_reads(), reads_before);
    }

    #[test]
    fn multi_level_tree_prefetches_lower_levels_but_not_the_top() {
        // hashes_per_block_bits = 7 for (4096/32=128=2^7); 1<<20 data blocks
        // needs 3 levels (128^2 = 16384 < 1<<20 <= 128^3).
        let v = verifier(1 << 20, 20_000);
        run_with_cluster_bytes(&v, &PrefetchTask { start_block: 0, block_count: 1 }, 0);
        assert!(v.cache.total_reads() > 0);
    }

    #[test]
    fn zero_block_count_is_a_no_op() {
        let v = verifier(4, 1);
        let reads_before = v.cache.total_reads();
        run_with_cluster_bytes(&v, &PrefetchTask { start_block: 0, block_count: 0 }, 4096);
        assert_eq!(v.cache.total_reads(), reads_before);
    }

    #[test]
    fn cluster_rounding_clips_to_hash_volume_size() {
        let mut lo = 0u64;
        let mut hi = 0u64;
        let changed = round_to_cluster(&mut lo, &mut hi, 1 << 20, 12, 4);
        assert!(changed);
        assert!(hi < 4);
    }

    #[test]
    fn zero_cluster_setting_skips_rounding() {
        let mut lo = 5u64;
        let mut hi = 9u64;
        let changed = round_to_cluster(&mut lo, &mut hi, 0, 12, 1000);
        assert!(!changed);
        assert_eq!((lo, hi), (5, 9));
    }
}
