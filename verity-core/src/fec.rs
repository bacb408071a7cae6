//! The forward-error-correction collaborator (out of scope per spec.md §1):
//! the core only ever calls through this trait to ask "try to recover this
//! block", never reimplements Reed-Solomon or any other FEC scheme itself.

use crate::error::BlockKind;

/// A single repair attempt. `block` is the hash-block index (for
/// `BlockKind::Metadata`) or the data-block index (for `BlockKind::Data`)
/// that failed verification; `buffer` is the corrupted bytes the
/// collaborator may repair in place.
pub trait FecDecoder: Send + Sync {
    /// Attempt to repair `buffer` in place. Returns `true` if the repair
    /// succeeded and `buffer` now holds corrected bytes the caller should
    /// trust without rehashing.
    fn decode(&self, kind: BlockKind, block: u64, buffer: &mut [u8]) -> bool;

    /// Called once per I/O after verification completes (successfully or
    /// not), mirroring `verity_fec_finish_io`. Most implementations need
    /// nothing here; the default is a no-op.
    fn finish_io(&self) {}
}

/// A [`FecDecoder`] that never recovers anything, for verifiers built
/// without FEC support (`verity_fec_is_enabled(v) == false`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFec;

impl FecDecoder for NoFec {
    fn decode(&self, _kind: BlockKind, _block: u64, _buffer: &mut [u8]) -> bool {
        false
    }
}
