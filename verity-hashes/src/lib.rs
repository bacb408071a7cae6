//! Incremental, salted digest pipeline driving the hash-tree's cryptographic
//! primitive (component C of the verifier).
//!
//! The pipeline wraps an abstract, incremental digest algorithm and applies
//! the salt discipline mandated by the on-disk format version: the salt is
//! either mixed in right after `init` (version 1) or right before `final`
//! (version 0). Callers never see the raw algorithm state directly — they
//! drive everything through [`DigestPipeline`].

use std::fmt;

use smallvec::SmallVec;
use thiserror::Error;

/// Inline digest buffer large enough for SHA-512 without heap allocation.
pub type DigestBuf = SmallVec<[u8; 64]>;

/// Selects where the salt is mixed into the digest computation.
///
/// `V0` matches the original Chromium OS dm-verity format: the salt is
/// appended just before `final`. `V1` mixes the salt in immediately after
/// `init`, before any data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FormatVersion {
    V0 = 0,
    V1 = 1,
}

impl FormatVersion {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FormatVersion::V0),
            1 => Some(FormatVersion::V1),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("digest engine failed: {0}")]
    EngineFailure(String),
}

pub type DigestResult<T> = Result<T, DigestError>;

/// A single incremental digest computation. Implementations wrap a concrete
/// hash algorithm's running state; the pipeline never inspects it directly.
pub trait IncrementalState: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>, out: &mut [u8]) -> DigestResult<()>;
}

/// An abstract digest algorithm: produces fresh incremental state and knows
/// its own output width. The hash-tree core is generic over this trait so it
/// never hard-codes SHA-256 or SHA-512.
pub trait DigestAlgorithm: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn digest_size(&self) -> usize;
    fn new_state(&self) -> Box<dyn IncrementalState>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Algorithm;

impl DigestAlgorithm for Sha256Algorithm {
    fn name(&self) -> &'static str {
        "sha256"
    }
    fn digest_size(&self) -> usize {
        32
    }
    fn new_state(&self) -> Box<dyn IncrementalState> {
        Box::new(Sha256State(sha2::Sha256::default()))
    }
}

struct Sha256State(sha2::Sha256);

impl IncrementalState for Sha256State {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.0.update(data);
    }
    fn finalize(self: Box<Self>, out: &mut [u8]) -> DigestResult<()> {
        use sha2::Digest;
        let digest = self.0.finalize();
        if out.len() != digest.len() {
            return Err(DigestError::EngineFailure(format!("expected {} bytes, got {}", digest.len(), out.len())));
        }
        out.copy_from_slice(&digest);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512Algorithm;

impl DigestAlgorithm for Sha512Algorithm {
    fn name(&self) -> &'static str {
        "sha512"
    }
    fn digest_size(&self) -> usize {
        64
    }
    fn new_state(&self) -> Box<dyn IncrementalState> {
        Box::new(Sha512State(sha2::Sha512::default()))
    }
}

struct Sha512State(sha2::Sha512);

impl IncrementalState for Sha512State {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.0.update(data);
    }
    fn finalize(self: Box<Self>, out: &mut [u8]) -> DigestResult<()> {
        use sha2::Digest;
        let digest = self.0.finalize();
        if out.len() != digest.len() {
            return Err(DigestError::EngineFailure(format!("expected {} bytes, got {}", digest.len(), out.len())));
        }
        out.copy_from_slice(&digest);
        Ok(())
    }
}

/// Resolve an algorithm by its textual construction-time name. The textual
/// construction dialect itself is out of scope, but the core needs some way
/// to turn `algorithm_name` into a concrete [`DigestAlgorithm`].
pub fn algorithm_by_name(name: &str) -> Option<Box<dyn DigestAlgorithm>> {
    match name {
        "sha256" => Some(Box::new(Sha256Algorithm)),
        "sha512" => Some(Box::new(Sha512Algorithm)),
        _ => None,
    }
}

/// An incremental, salted digest computation in progress.
///
/// Construct with [`DigestPipeline::init`], feed bytes with `update` /
/// `update_scatter`, and consume with `finalize`. The salt is applied
/// exactly once, at the point dictated by `version`.
pub struct DigestPipeline<'a> {
    salt: &'a [u8],
    version: FormatVersion,
    state: Box<dyn IncrementalState>,
}

impl<'a> DigestPipeline<'a> {
    pub fn init(algorithm: &dyn DigestAlgorithm, salt: &'a [u8], version: FormatVersion) -> Self {
        let mut state = algorithm.new_state();
        if version == FormatVersion::V1 && !salt.is_empty() {
            state.update(salt);
        }
        Self { salt, version, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Feed a flat buffer as a sequence of page-bounded fragments, exactly as
    /// the kernel driver must split non-contiguous (`vmalloc`) pages. In a
    /// userspace context `buf` is itself contiguous, but callers may still be
    /// handing us a sub-slice of a larger page-backed mapping that starts at
    /// an arbitrary offset into its first page; `start_page_offset` carries
    /// that context so the split lands on true page boundaries.
    pub fn update_scatter(&mut self, buf: &[u8], start_page_offset: usize, page_size: usize) {
        for fragment in scatter_fragments(buf, start_page_offset, page_size) {
            self.update(fragment);
        }
    }

    pub fn finalize(mut self, out: &mut [u8]) -> DigestResult<()> {
        if self.version == FormatVersion::V0 && !self.salt.is_empty() {
            self.state.update(self.salt);
        }
        self.state.finalize(out)
    }
}

/// Split `buf` into fragments that each lie within a single page of size
/// `page_size`, given that `buf[0]` sits at `start_page_offset` bytes into
/// its host page. `page_size` must be a power of two.
pub fn scatter_fragments(buf: &[u8], start_page_offset: usize, page_size: usize) -> SmallVec<[&[u8]; 4]> {
    debug_assert!(page_size.is_power_of_two());
    let mut out = SmallVec::new();
    if buf.is_empty() {
        return out;
    }
    let mut offset_in_page = start_page_offset & (page_size - 1);
    let mut rest = buf;
    loop {
        let room = page_size - offset_in_page;
        if rest.len() <= room {
            out.push(rest);
            break;
        }
        let (head, tail) = rest.split_at(room);
        out.push(head);
        rest = tail;
        offset_in_page = 0;
    }
    out
}

/// One-shot convenience: hash `data` in full, applying the salt discipline
/// for `version`, writing the result into `out`.
pub fn hash(algorithm: &dyn DigestAlgorithm, salt: &[u8], version: FormatVersion, data: &[u8], out: &mut [u8]) -> DigestResult<()> {
    let mut pipeline = DigestPipeline::init(algorithm, salt, version);
    pipeline.update(data);
    pipeline.finalize(out)
}
