//! `verity-core`: the hash-tree verification engine, I/O dispatch pipeline
//! and failure-policy state machine for a transparent block-device
//! integrity verifier.
//!
//! This crate is a library, not a kernel module: every host-environment
//! coupling (reboot/halt, kernel-visible events, worker pools), the FEC
//! recovery collaborator, and the root-hash signature collaborator are
//! supplied by the caller as trait objects at construction time (spec §9,
//! "Host-environment coupling"). The textual construction-parameter dialect
//! and the FEC/signature algorithms themselves are out of scope; see
//! `DESIGN.md` for the full grounding ledger.

pub mod bitmap;
pub mod dispatch;
pub mod error;
pub mod fec;
pub mod geometry;
pub mod host;
pub mod params;
pub mod policy;
pub mod pool;
pub mod prefetch;
pub mod signature;
pub mod status;
pub mod tunables;
pub mod verify;

use std::sync::Arc;

use verity_cache::{HashBlockCache, HashBlockSource};
use verity_hashes::algorithm_by_name;

use crate::bitmap::ValidatedOnceBitmap;
use crate::fec::{FecDecoder, NoFec};
use crate::geometry::Geometry;
use crate::host::{HostEvents, HostHalt};
use crate::params::{ParamsError, VerityParams};
use crate::policy::{Mode, PolicyEngine};
use crate::signature::{NoSignatureCheck, RootSignatureVerifier};
use crate::verify::Verifier;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Geometry(#[from] geometry::GeometryError),
    #[error("unknown digest algorithm {0:?}")]
    UnknownAlgorithm(String),
    #[error("root hash signature verification failed: {0}")]
    SignatureRejected(String),
    #[error("failed to compute zero-block digest: {0}")]
    ZeroDigest(#[from] verity_hashes::DigestError),
}

/// Builds a [`Verifier`] from typed construction parameters plus the
/// external collaborators (spec §9: "The core takes them by capability at
/// construction; nothing is global").
pub struct VerifierBuilder<S: HashBlockSource> {
    params: VerityParams,
    source: S,
    hash_cache_capacity: Option<usize>,
    events: Arc<dyn HostEvents>,
    halt: Arc<dyn HostHalt>,
    fec: Arc<dyn FecDecoder>,
    signature: Arc<dyn RootSignatureVerifier>,
}

impl<S: HashBlockSource> VerifierBuilder<S> {
    pub fn new(params: VerityParams, source: S, events: Arc<dyn HostEvents>, halt: Arc<dyn HostHalt>) -> Self {
        Self { params, source, hash_cache_capacity: None, events, halt, fec: Arc::new(NoFec), signature: Arc::new(NoSignatureCheck) }
    }

    pub fn hash_cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.hash_cache_capacity = capacity;
        self
    }

    pub fn fec(mut self, fec: Arc<dyn FecDecoder>) -> Self {
        self.fec = fec;
        self
    }

    pub fn signature_verifier(mut self, signature: Arc<dyn RootSignatureVerifier>) -> Self {
        self.signature = signature;
        self
    }

    pub fn build(self) -> Result<Verifier<S>, BuildError> {
        self.params.validate()?;

        let algorithm = algorithm_by_name(&self.params.algorithm_name)
            .ok_or_else(|| BuildError::UnknownAlgorithm(self.params.algorithm_name.clone()))?;
        let root_digest = self.params.root_digest_bytes()?;
        if root_digest.len() != algorithm.digest_size() {
            return Err(BuildError::Geometry(geometry::GeometryError::RootDigestLength {
                actual: root_digest.len(),
                expected: algorithm.digest_size(),
            }));
        }
        self.signature.verify(&root_digest).map_err(BuildError::SignatureRejected)?;

        let salt = self.params.salt_bytes()?;
        if salt.len() > 256 {
            return Err(BuildError::Geometry(geometry::GeometryError::SaltTooLong(salt.len())));
        }

        let hash_volume_size_blocks = self.source.size_in_blocks();
        let geometry = Geometry::new(
            self.params.data_block_size.ilog2(),
            self.params.hash_block_size.ilog2(),
            algorithm.digest_size(),
            self.params.data_blocks,
            self.params.hash_start_block,
            self.params.version,
            hash_volume_size_blocks,
        )?;

        let zero_digest = if self.params.options.ignore_zero_blocks {
            let zero_block = vec![0u8; self.params.data_block_size as usize];
            let mut digest = vec![0u8; algorithm.digest_size()];
            verity_hashes::hash(algorithm.as_ref(), &salt, self.params.version, &zero_block, &mut digest)?;
            Some(digest)
        } else {
            None
        };

        let validated_once =
            if self.params.options.check_at_most_once { Some(ValidatedOnceBitmap::new(self.params.data_blocks)) } else { None };

        let mode = self.params.options.mode_override.unwrap_or(Mode::Eio);
        let policy = PolicyEngine::new(mode, self.params.data_device.clone(), self.events, self.halt);

        let cache = HashBlockCache::new(self.source, self.params.hash_block_size as usize, self.hash_cache_capacity);

        Ok(Verifier {
            geometry,
            cache,
            algorithm,
            salt,
            root_digest,
            zero_digest,
            validated_once,
            policy,
            fec: self.fec,
            device_name: self.params.data_device,
        })
    }
}
