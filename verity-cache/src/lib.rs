//! Hash-block cache adapter (component B).
//!
//! Wraps an arbitrary backing [`HashBlockSource`] with an in-memory keyed
//! cache of fixed-size byte buffers, each carrying one auxiliary bit: a
//! `verified` flag that starts `false` on every freshly allocated buffer and
//! is only ever set to `true`, never cleared. The flag is deliberately
//! lock-free (a single `AtomicBool`); a benign race that re-verifies the same
//! buffer twice is harmless, since both writes converge on `true`.
//!
//! This mirrors the shape of `database::cache::Cache` (an `IndexMap` guarded
//! by a `parking_lot::RwLock`, random eviction when full) generalized with
//! the per-entry auxiliary state a generic KV cache doesn't need.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("hash block {block} unreadable: {source}")]
    Io { block: u64, source: std::io::Error },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// The backing store a [`HashBlockCache`] reads through on a miss. Supplied
/// by the caller (a file, a device, an in-memory fixture for tests).
pub trait HashBlockSource: Send + Sync {
    /// Fill `buf` (exactly `hash_block_size` bytes) with the contents of hash
    /// block `block_id`.
    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> std::io::Result<()>;

    /// Total number of hash blocks available on the backing device.
    fn size_in_blocks(&self) -> u64;
}

struct Entry {
    data: RwLock<Vec<u8>>,
    verified: AtomicBool,
}

/// An opaque handle over a single cached hash block, borrowed for the
/// duration of a verification step. Stable for the lifetime of the handle;
/// release it (or simply drop it) to return the borrow.
#[derive(Clone)]
pub struct BlockHandle(Arc<Entry>);

impl BlockHandle {
    /// Run `f` over the buffer's current bytes.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.0.data.read())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.data.read().clone()
    }

    /// Replace the buffer's contents in place, e.g. after a successful FEC
    /// repair. Does not touch the `verified` flag; callers set that
    /// separately once the replacement is trusted.
    pub fn overwrite(&self, new_data: &[u8]) {
        self.0.data.write().copy_from_slice(new_data);
    }

    pub fn verified(&self) -> bool {
        self.0.verified.load(Ordering::Relaxed)
    }

    /// Mark this hash block verified. Monotonic: once set, never cleared.
    pub fn set_verified(&self) {
        self.0.verified.store(true, Ordering::Relaxed);
    }
}

/// Keyed cache of hash blocks, each annotated with a `verified` bit.
pub struct HashBlockCache<S: HashBlockSource> {
    source: S,
    hash_block_size: usize,
    entries: RwLock<IndexMap<u64, Arc<Entry>>>,
    /// `None` means unbounded; `Some(n)` evicts a random entry once full,
    /// matching `database::cache::Cache`'s `CachePolicy::Unit` eviction.
    capacity: Option<usize>,
    reads: AtomicU64,
}

impl<S: HashBlockSource> HashBlockCache<S> {
    pub fn new(source: S, hash_block_size: usize, capacity: Option<usize>) -> Self {
        Self { source, hash_block_size, entries: RwLock::new(IndexMap::new()), capacity, reads: AtomicU64::new(0) }
    }

    /// Read hash block `block_id`, serving from cache on a hit. On a miss,
    /// allocates a fresh buffer (its `verified` flag initialized to `false`,
    /// the cache's allocation-callback contract) and reads through `source`.
    pub fn read(&self, block_id: u64) -> CacheResult<BlockHandle> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.entries.read().get(&block_id).cloned() {
            return Ok(BlockHandle(entry));
        }

        let mut buf = vec![0u8; self.hash_block_size];
        self.source.read_block(block_id, &mut buf).map_err(|source| CacheError::Io { block: block_id, source })?;
        let fresh = Arc::new(Entry { data: RwLock::new(buf), verified: AtomicBool::new(false) });

        let mut guard = self.entries.write();
        // Another reader may have raced us to the insert; keep whichever
        // buffer is already resident rather than clobbering its verified bit.
        if let Some(existing) = guard.get(&block_id).cloned() {
            return Ok(BlockHandle(existing));
        }
        if let Some(capacity) = self.capacity {
            if guard.len() >= capacity && capacity > 0 {
                let victim = rand::thread_rng().gen_range(0..guard.len());
                guard.swap_remove_index(victim);
            }
        }
        guard.insert(block_id, fresh.clone());
        Ok(BlockHandle(fresh))
    }

    /// Return a borrow obtained from [`read`](Self::read). A no-op beyond
    /// dropping the handle today, kept as an explicit call so the engine's
    /// read/release discipline reads the same whether or not a future
    /// backing implementation needs to pin buffers.
    pub fn release(&self, _handle: BlockHandle) {}

    /// Advisory, non-blocking-from-the-caller's-perspective prefetch: warm
    /// the cache for `[start, start + count)`. Failures are swallowed.
    pub fn prefetch(&self, start: u64, count: u64) {
        for block in start..start.saturating_add(count) {
            let _ = self.read(block);
        }
    }

    pub fn size_in_blocks(&self) -> u64 {
        self.source.size_in_blocks()
    }

    pub fn hash_block_size(&self) -> usize {
        self.hash_block_size
    }

    /// Total number of [`read`](Self::read) calls observed, cache hit or
    /// miss. Exposed so tests can assert a code path never touches the
    /// cache (the `check_at_most_once` fast path).
    pub fn total_reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}
