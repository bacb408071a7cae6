//! End-to-end scenarios over a full request/dispatch/verify/policy stack:
//! a tree built from scratch, a `Dispatcher` in front of it, and an
//! in-memory data device and hash volume standing in for real block
//! devices. Grounded on the arrange/act/assert shape of
//! `consensus/tests/pipeline_tests.rs`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use verity_cache::HashBlockCache;
use verity_core::dispatch::{Dispatcher, ReadRequest};
use verity_core::error::{BlockKind, VerityError};
use verity_core::fec::NoFec;
use verity_core::host::{HostEvents, HostHalt};
use verity_core::policy::{CorruptionEvent, Mode, PolicyEngine};
use verity_core::status::info_char;
use verity_core::verify::Verifier;
use verity_hashes::{FormatVersion, Sha256Algorithm};

mod common;
use common::{build_hash_tree, InlinePool, MemDevice, MemSource};

/// Records every emitted event instead of logging it.
#[derive(Default)]
struct RecordingEvents(Mutex<Vec<CorruptionEvent>>);
impl HostEvents for RecordingEvents {
    fn emit(&self, event: CorruptionEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// Counts halt/reboot invocations instead of acting on them.
#[derive(Default)]
struct RecordingHalt {
    halts: AtomicUsize,
    reboots: AtomicUsize,
}
impl HostHalt for RecordingHalt {
    fn halt(&self, _device: &str, _block: u64, _kind: BlockKind) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }
    fn reboot(&self, _reason: &str) {
        self.reboots.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds a verifier + dispatcher pair over `data_blocks` 4096-byte blocks,
/// all matching the spec's canonical construction parameters (sha256, v1).
fn build(
    data_blocks: Vec<Vec<u8>>,
    mode: Mode,
    check_at_most_once: bool,
    ignore_zero_blocks: bool,
    events: Arc<RecordingEvents>,
    halt: Arc<RecordingHalt>,
) -> (Arc<Verifier<MemSource>>, Dispatcher<MemSource>) {
    let salt: Vec<u8> = Vec::new();
    let (hash_blocks, root_digest, geometry) =
        build_hash_tree(&data_blocks, &Sha256Algorithm, &salt, FormatVersion::V1, 12, 12);

    let validated_once =
        if check_at_most_once { Some(verity_core::bitmap::ValidatedOnceBitmap::new(geometry.data_blocks)) } else { None };
    let zero_digest = if ignore_zero_blocks {
        let mut digest = vec![0u8; 32];
        verity_hashes::hash(&Sha256Algorithm, &salt, FormatVersion::V1, &vec![0u8; 4096], &mut digest).unwrap();
        Some(digest)
    } else {
        None
    };

    let cache = HashBlockCache::new(MemSource(hash_blocks), geometry.hash_block_size(), None);
    let verifier = Arc::new(Verifier {
        geometry,
        cache,
        algorithm: Box::new(Sha256Algorithm),
        salt,
        root_digest,
        zero_digest,
        validated_once,
        policy: PolicyEngine::new(mode, "testdev", events, halt),
        fec: Arc::new(NoFec),
        device_name: "testdev".into(),
    });

    let device = Arc::new(MemDevice { blocks: data_blocks, block_size: 4096 });
    let dispatcher = Dispatcher::new(verifier.clone(), device, Arc::new(InlinePool), false);
    (verifier, dispatcher)
}

fn data_block(fill: u8) -> Vec<u8> {
    vec![fill; 4096]
}

fn read_block(d: &Dispatcher<MemSource>, block: u64) -> Result<Vec<u8>, VerityError> {
    let result = Arc::new(Mutex::new(None));
    let result2 = result.clone();
    d.map(ReadRequest {
        offset_bytes: block * 4096,
        length_bytes: 4096,
        completion: Box::new(move |r| *result2.lock().unwrap() = Some(r)),
    })
    .unwrap();
    result.lock().unwrap().take().unwrap()
}

#[test]
fn clean_read_reports_verified_status() {
    // Arrange: 8 distinct clean data blocks.
    let data: Vec<Vec<u8>> = (0..8u8).map(data_block).collect();
    let events = Arc::new(RecordingEvents::default());
    let halt = Arc::new(RecordingHalt::default());
    let (verifier, dispatcher) = build(data.clone(), Mode::Eio, false, false, events, halt);

    // Act
    let got = read_block(&dispatcher, 3).unwrap();

    // Assert
    assert_eq!(got, data[3]);
    assert_eq!(info_char(verifier.policy.hash_failed()), 'V');
}

#[test]
fn zero_block_takes_the_fast_path_without_trusting_backing_bytes() {
    // Arrange: block 2 is all zero on the tree, with `ignore_zero_blocks`
    // enabled. Tamper with the backing device's copy of that same block
    // after the tree is built, so a pass that actually hashed the device's
    // bytes would fail verification instead of zero-filling.
    let mut data: Vec<Vec<u8>> = (0..8u8).map(data_block).collect();
    data[2] = vec![0u8; 4096];
    let events = Arc::new(RecordingEvents::default());
    let halt = Arc::new(RecordingHalt::default());
    let (verifier, _clean_dispatcher) = build(data, Mode::Eio, false, true, events, halt);
    let tampered_device = Arc::new(MemDevice {
        blocks: (0..8u8).map(|i| if i == 2 { vec![0xAAu8; 4096] } else { data_block(i) }).collect(),
        block_size: 4096,
    });
    let dispatcher = Dispatcher::new(verifier.clone(), tampered_device, Arc::new(InlinePool), false);

    // Act
    let got = read_block(&dispatcher, 2).unwrap();

    // Assert: zero-filled, not the tampered device bytes, and no corruption
    // is reported since the fast path never consulted the hash tree for it.
    assert!(got.iter().all(|&b| b == 0));
    assert!(!verifier.policy.hash_failed());
}

#[test]
fn corruption_under_panic_mode_halts_exactly_once_and_marks_status_corrupted() {
    // Arrange: build the tree over clean data, then corrupt the backing
    // device's copy of block 5 without touching the hash tree.
    let clean: Vec<Vec<u8>> = (0..8u8).map(data_block).collect();
    let events = Arc::new(RecordingEvents::default());
    let halt = Arc::new(RecordingHalt::default());
    let (verifier, _clean_dispatcher) = build(clean.clone(), Mode::Panic, false, false, events.clone(), halt.clone());
    let corrupted_device = Arc::new(MemDevice {
        blocks: clean.iter().enumerate().map(|(i, b)| if i == 5 { vec![0xAAu8; 4096] } else { b.clone() }).collect(),
        block_size: 4096,
    });
    let dispatcher = Dispatcher::new(verifier.clone(), corrupted_device, Arc::new(InlinePool), false);

    // Act
    let result = read_block(&dispatcher, 5);

    // Assert
    assert!(matches!(result, Err(VerityError::IntegrityError { kind: BlockKind::Data, block: 5 })));
    assert_eq!(halt.halts.load(Ordering::SeqCst), 1);
    assert_eq!(halt.reboots.load(Ordering::SeqCst), 0);
    let emitted = events.0.lock().unwrap();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].wire_format(), "KIND=0,5");
    assert_eq!(info_char(verifier.policy.hash_failed()), 'C');
}

#[test]
fn corruption_under_logging_mode_returns_bogus_bytes_without_halting() {
    // Arrange
    let clean: Vec<Vec<u8>> = (0..8u8).map(data_block).collect();
    let events = Arc::new(RecordingEvents::default());
    let halt = Arc::new(RecordingHalt::default());
    let (verifier, _unused) = build(clean.clone(), Mode::Logging, false, false, events.clone(), halt.clone());
    let corrupted_device = Arc::new(MemDevice {
        blocks: clean.iter().enumerate().map(|(i, b)| if i == 5 { vec![0xAAu8; 4096] } else { b.clone() }).collect(),
        block_size: 4096,
    });
    let dispatcher = Dispatcher::new(verifier.clone(), corrupted_device, Arc::new(InlinePool), false);

    // Act
    let got = read_block(&dispatcher, 5).unwrap();

    // Assert: the request succeeds, but with the corrupted bytes returned
    // verbatim, matching dm-verity's "ignore_corruption" behavior.
    assert_eq!(got, vec![0xAAu8; 4096]);
    assert_eq!(verifier.policy.corrupted_errs(), 1);
    assert_eq!(halt.halts.load(Ordering::SeqCst), 0);
    assert_eq!(info_char(verifier.policy.hash_failed()), 'C');
}

#[test]
fn check_at_most_once_skips_the_hash_tree_entirely_on_the_second_read() {
    // Arrange
    let data: Vec<Vec<u8>> = (0..8u8).map(data_block).collect();
    let events = Arc::new(RecordingEvents::default());
    let halt = Arc::new(RecordingHalt::default());
    let (verifier, dispatcher) = build(data.clone(), Mode::Eio, true, false, events, halt);

    // Act
    let first = read_block(&dispatcher, 4).unwrap();
    let reads_after_first = verifier.cache.total_reads();
    let second = read_block(&dispatcher, 4).unwrap();

    // Assert: the bitmap short-circuits before any hash block is touched.
    assert_eq!(first, data[4]);
    assert_eq!(second, data[4]);
    assert_eq!(verifier.cache.total_reads(), reads_after_first);
}

#[test]
fn corrupted_errs_saturates_at_one_hundred_across_many_corrupted_blocks() {
    // Arrange: 150 data blocks, every one of them corrupted on the backing
    // device relative to the tree built over their clean contents.
    let clean: Vec<Vec<u8>> = (0..150u32).map(|i| vec![(i % 251) as u8; 64]).collect();
    let salt: Vec<u8> = Vec::new();
    let (hash_blocks, root_digest, geometry) =
        build_hash_tree(&clean, &Sha256Algorithm, &salt, FormatVersion::V1, 6, 8);
    let cache = HashBlockCache::new(MemSource(hash_blocks), geometry.hash_block_size(), None);
    let events = Arc::new(RecordingEvents::default());
    let halt = Arc::new(RecordingHalt::default());
    let verifier = Arc::new(Verifier {
        geometry,
        cache,
        algorithm: Box::new(Sha256Algorithm),
        salt,
        root_digest,
        zero_digest: None,
        validated_once: None,
        policy: PolicyEngine::new(Mode::Logging, "testdev", events.clone(), halt.clone()),
        fec: Arc::new(NoFec),
        device_name: "testdev".into(),
    });
    let corrupted: Vec<Vec<u8>> = clean.iter().map(|b| b.iter().map(|&x| !x).collect()).collect();
    let device = Arc::new(MemDevice { blocks: corrupted, block_size: 64 });
    let dispatcher = Dispatcher::new(verifier.clone(), device, Arc::new(InlinePool), false);

    // Act: read every block individually so each failure is reported once.
    for block in 0..150u64 {
        let _ = read_block(&dispatcher, block);
    }

    // Assert
    assert_eq!(verifier.policy.corrupted_errs(), 100);
    assert!(verifier.policy.hash_failed());
    assert_eq!(events.0.lock().unwrap().len(), 100);
    assert_eq!(halt.halts.load(Ordering::SeqCst), 0);
}
