//! Block verifier (component E): compose level verifiers top-down to
//! obtain the expected digest for one data block, hash the block's
//! payload, and compare.
//!
//! Grounded on `verity_hash_for_block` + the per-block loop body of
//! `verity_verify_io` in
//! `examples/original_source/drivers/md/dm-verity-target.c`.

use subtle::ConstantTimeEq;

use verity_cache::HashBlockSource;
use verity_hashes::DigestPipeline;

use crate::error::{BlockKind, VerityError};
use crate::policy::PolicyOutcome;
use crate::verify::level::{verify_level, LevelOutcome};
use crate::verify::Verifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// `payload` holds the bytes the caller should return upstream — either
    /// the backing device's own bytes (verified or FEC-repaired) or bytes
    /// already resident from a prior `check_at_most_once` pass.
    Verified,
    /// The expected digest was `zero_digest`; `payload` has been zero-filled
    /// and the backing device's bytes were never trusted.
    ZeroFilled,
}

/// Verify data block `block`, whose bytes are in `payload`
/// (`data_block_size` bytes). `want` is scratch space of `digest_size`
/// bytes reused across calls by the caller to avoid reallocating per block.
pub fn verify_block<S: HashBlockSource>(
    v: &Verifier<S>,
    block: u64,
    payload: &mut [u8],
    want: &mut [u8],
) -> Result<BlockOutcome, VerityError> {
    if let Some(bitmap) = &v.validated_once {
        if bitmap.is_set(block) {
            return Ok(BlockOutcome::Verified);
        }
    }

    match verify_level(v, block, 0, true, want)? {
        LevelOutcome::Ok => {}
        LevelOutcome::Skipped => {
            want.copy_from_slice(&v.root_digest);
            for level in (0..v.geometry.levels).rev() {
                verify_level(v, block, level, false, want)?;
            }
        }
    }

    if let Some(zero_digest) = &v.zero_digest {
        if bool::from(want.ct_eq(zero_digest)) {
            payload.fill(0);
            return Ok(BlockOutcome::ZeroFilled);
        }
    }

    let mut real = vec![0u8; v.digest_size()];
    let mut pipeline = DigestPipeline::init(v.algorithm.as_ref(), &v.salt, v.geometry.version);
    pipeline.update(payload);
    pipeline.finalize(&mut real)?;

    if bool::from(real.ct_eq(want)) {
        if let Some(bitmap) = &v.validated_once {
            bitmap.set(block);
        }
        return Ok(BlockOutcome::Verified);
    }

    if v.fec.decode(BlockKind::Data, block, payload) {
        return Ok(BlockOutcome::Verified);
    }

    let hash_volume_range = (v.geometry.level_base[0], v.cache.size_in_blocks());
    let data_volume_range = (0, v.geometry.data_blocks);
    let outcome = v.policy.handle_failure(BlockKind::Data, block, false, hash_volume_range, data_volume_range);
    match outcome {
        PolicyOutcome::Escalate => Err(VerityError::IntegrityError { kind: BlockKind::Data, block }),
        // Logging mode: the request continues with the (possibly bogus)
        // bytes already in `payload` — an explicit user opt-in (spec §4.G.5).
        PolicyOutcome::Recovered => Ok(BlockOutcome::Verified),
    }
}
