//! The hash-tree verification engine proper: the [`Verifier`] struct that
//! owns immutable geometry plus the shared collaborators (cache, policy,
//! FEC, bitmap), and the two operations built on top of it — [`level`]
//! (component D) and [`block`] (component E).

pub mod block;
pub mod level;

use std::sync::Arc;

use verity_cache::HashBlockCache;
use verity_hashes::DigestAlgorithm;

use crate::bitmap::ValidatedOnceBitmap;
use crate::fec::FecDecoder;
use crate::geometry::Geometry;
use crate::policy::PolicyEngine;

pub use block::BlockOutcome;
pub use level::LevelOutcome;

/// Everything the verification engine needs, shared read-only across every
/// worker in the verification pool (spec §5, "Immutable after
/// construction").
pub struct Verifier<S: verity_cache::HashBlockSource> {
    pub geometry: Geometry,
    pub cache: HashBlockCache<S>,
    pub algorithm: Box<dyn DigestAlgorithm>,
    pub salt: Vec<u8>,
    pub root_digest: Vec<u8>,
    pub zero_digest: Option<Vec<u8>>,
    pub validated_once: Option<ValidatedOnceBitmap>,
    pub policy: PolicyEngine,
    pub fec: Arc<dyn FecDecoder>,
    pub device_name: String,
}

impl<S: verity_cache::HashBlockSource> Verifier<S> {
    pub fn digest_size(&self) -> usize {
        self.algorithm.digest_size()
    }
}
