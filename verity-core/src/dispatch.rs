//! I/O dispatcher (component F): bounds-checks incoming requests, attaches
//! verification metadata, schedules hash-block prefetch, submits to the
//! backing data device, and on completion enqueues verification.
//!
//! Grounded on `verity_map` / `verity_end_io` / `verity_work` /
//! `verity_finish_io` in
//! `examples/original_source/drivers/md/dm-verity-target.c`. The worker
//! dispatch shape (a pool taking boxed closures) mirrors
//! `BlockBodyProcessor::worker`'s `receiver.recv()` loop in
//! `consensus/src/pipeline/body_processor/processor.rs`, simplified to a
//! direct `WorkerPool::spawn` since this core has no upstream channel of
//! its own — the upstream request arrives as a direct call to `map`.

use std::sync::Arc;

use verity_cache::HashBlockSource;

use crate::error::VerityError;
use crate::host::WorkerPool;
use crate::prefetch::{self, PrefetchTask};
use crate::verify::block::{verify_block, BlockOutcome};
use crate::verify::Verifier;

/// The backing data device a dispatcher submits remapped reads to. Models
/// `generic_make_request` + `verity_end_io`: `submit_read` must invoke
/// `on_complete` exactly once, synchronously or from another thread.
pub trait DataDevice: Send + Sync {
    fn submit_read(&self, start_block: u64, buf: Vec<u8>, on_complete: Box<dyn FnOnce(std::io::Result<Vec<u8>>) + Send>);
}

/// Result delivered to the upstream caller's completion callback.
pub type IoCompletion = Result<Vec<u8>, VerityError>;

/// An incoming read request (spec §3, "in-flight request" minus the parts
/// that are implementation detail of this dispatcher: the scatter cursor is
/// a plain contiguous buffer here, since the upstream callers this core
/// targets — a FUSE layer, a userspace block emulator, a test harness — all
/// hand over one contiguous allocation per request rather than a kernel
/// `bio`'s page list).
pub struct ReadRequest {
    pub offset_bytes: u64,
    pub length_bytes: u64,
    pub completion: Box<dyn FnOnce(IoCompletion) + Send>,
}

pub struct Dispatcher<S: HashBlockSource + 'static> {
    verifier: Arc<Verifier<S>>,
    device: Arc<dyn DataDevice>,
    pool: Arc<dyn WorkerPool>,
    /// Whether a FEC collaborator is actually wired in. Mirrors
    /// `verity_fec_is_enabled(v)`: when false, a data-device I/O error is
    /// forwarded to policy immediately instead of being retried through FEC.
    fec_enabled: bool,
}

impl<S: HashBlockSource + 'static> Dispatcher<S> {
    pub fn new(verifier: Arc<Verifier<S>>, device: Arc<dyn DataDevice>, pool: Arc<dyn WorkerPool>, fec_enabled: bool) -> Self {
        Self { verifier, device, pool, fec_enabled }
    }

    /// Validate and dispatch one upstream read request (spec §4.F `map`).
    /// Writes are out of scope for this core and are rejected immediately;
    /// see [`VerityError::ReadOnly`].
    pub fn map(&self, request: ReadRequest) -> Result<(), VerityError> {
        let block_size = self.verifier.geometry.data_block_size() as u64;

        if request.length_bytes == 0 {
            return Err(VerityError::Misaligned);
        }
        if request.offset_bytes % block_size != 0 || request.length_bytes % block_size != 0 {
            return Err(VerityError::Misaligned);
        }

        let start_block = request.offset_bytes / block_size;
        let block_count = request.length_bytes / block_size;
        if start_block.saturating_add(block_count) > self.verifier.geometry.data_blocks {
            return Err(VerityError::OutOfRange);
        }

        prefetch::run(&self.verifier, &PrefetchTask { start_block, block_count });

        let verifier = self.verifier.clone();
        let pool = self.pool.clone();
        let fec_enabled = self.fec_enabled;
        let completion = request.completion;
        let length_bytes = request.length_bytes;

        self.device.submit_read(
            start_block,
            vec![0u8; length_bytes as usize],
            Box::new(move |result| {
                // Completion interceptor: runs in the backing device's
                // completion context. Does no verification itself — only
                // decides whether to enqueue a verification task.
                match result {
                    Err(io_err) if !fec_enabled => {
                        let hash_volume_range = (verifier.geometry.level_base[0], verifier.cache.size_in_blocks());
                        let data_volume_range = (0, verifier.geometry.data_blocks);
                        verifier.policy.handle_failure(
                            crate::error::BlockKind::Data,
                            start_block,
                            true,
                            hash_volume_range,
                            data_volume_range,
                        );
                        completion(Err(VerityError::IoError {
                            volume: crate::error::IoVolume::Data,
                            block: start_block,
                            source: io_err,
                        }));
                    }
                    Err(io_err) => {
                        // FEC enabled: still worth attempting per-block
                        // recovery, so fall through into the normal
                        // verification task with a zeroed buffer; FEC gets
                        // its chance inside `verify_block`.
                        log::warn!("verity: data device read failed, attempting FEC recovery: {io_err}");
                        let payload = vec![0u8; length_bytes as usize];
                        Self::spawn_verification(&verifier, &pool, start_block, block_count, payload, completion);
                    }
                    Ok(payload) => {
                        Self::spawn_verification(&verifier, &pool, start_block, block_count, payload, completion);
                    }
                }
            }),
        );

        Ok(())
    }

    fn spawn_verification(
        verifier: &Arc<Verifier<S>>,
        pool: &Arc<dyn WorkerPool>,
        start_block: u64,
        block_count: u64,
        mut payload: Vec<u8>,
        completion: Box<dyn FnOnce(IoCompletion) + Send>,
    ) {
        let verifier = verifier.clone();
        pool.spawn(Box::new(move || {
            let block_size = verifier.geometry.data_block_size();
            let mut want = vec![0u8; verifier.digest_size()];
            let mut status: Result<(), VerityError> = Ok(());

            for b in 0..block_count {
                let block = start_block + b;
                let start = (b as usize) * block_size;
                let end = start + block_size;
                match verify_block(&verifier, block, &mut payload[start..end], &mut want) {
                    Ok(BlockOutcome::Verified | BlockOutcome::ZeroFilled) => {}
                    Err(e) => {
                        status = Err(e);
                        break;
                    }
                }
            }

            verifier.fec.finish_io();

            match status {
                Ok(()) => completion(Ok(payload)),
                Err(e) => completion(Err(e)),
            }
        }));
    }
}
