//! Error taxonomy for the hash-tree engine (spec §7).
//!
//! `Misaligned` / `OutOfRange` / `ReadOnly` are contract violations by the
//! upstream caller and are never counted as corruption. `IoError` and
//! `DigestEngineError` are transient faults in the I/O or digest engine
//! itself. `IntegrityError` is the only non-transient kind: an actual
//! content mismatch against a trusted digest.

use thiserror::Error;

/// Which volume an `IoError` occurred against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoVolume {
    Data,
    Hash,
}

/// The kind of block a verification failure pertains to, matching the
/// wire-format `KIND=<0|1>` (`0 = DATA, 1 = METADATA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Data = 0,
    Metadata = 1,
}

#[derive(Debug, Error)]
pub enum VerityError {
    #[error("request is not aligned to the data block size")]
    Misaligned,

    #[error("request extends past the end of the data volume")]
    OutOfRange,

    #[error("device is read-only")]
    ReadOnly,

    #[error("{volume:?} volume I/O error at block {block}: {source}")]
    IoError { volume: IoVolume, block: u64, #[source] source: std::io::Error },

    #[error("digest engine failed: {0}")]
    DigestEngineError(#[from] verity_hashes::DigestError),

    #[error("{kind:?} block {block} failed integrity verification")]
    IntegrityError { kind: BlockKind, block: u64 },
}

impl VerityError {
    /// Whether this failure is a content mismatch (non-transient) as opposed
    /// to a fault in the I/O or digest engine itself (transient). Only
    /// non-transient failures are eligible to escalate to `Panic`.
    pub fn is_transient(&self) -> bool {
        !matches!(self, VerityError::IntegrityError { .. })
    }
}

pub type VerityResult<T> = Result<T, VerityError>;

impl From<verity_cache::CacheError> for VerityError {
    fn from(e: verity_cache::CacheError) -> Self {
        match e {
            verity_cache::CacheError::Io { block, source } => VerityError::IoError { volume: IoVolume::Hash, block, source },
        }
    }
}

