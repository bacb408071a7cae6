//! Global, process-wide tunables (spec §6): `prefetch_cluster` and the
//! wait-for-device flag. Grounded on `dm_verity_prefetch_cluster`/`dev_wait`
//! module parameters in
//! `examples/original_source/drivers/md/dm-verity-target.c`, reimplemented
//! as plain atomics instead of `module_param` sysfs entries since this is a
//! library, not a kernel module.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// `DM_VERITY_DEFAULT_PREFETCH_SIZE`.
pub const DEFAULT_PREFETCH_CLUSTER_BYTES: u32 = 262_144;

/// How often `wait_for_device` polls while `dev_wait` is set.
pub const DEVICE_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

static PREFETCH_CLUSTER_BYTES: AtomicU32 = AtomicU32::new(DEFAULT_PREFETCH_CLUSTER_BYTES);
static WAIT_FOR_DEVICE: AtomicBool = AtomicBool::new(false);

/// Current `prefetch_cluster` setting, in bytes (not yet rounded to a power
/// of two — callers round at the point of use, matching
/// `verity_prefetch_io`'s `READ_ONCE` + round-down-to-power-of-two pattern).
pub fn prefetch_cluster_bytes() -> u32 {
    PREFETCH_CLUSTER_BYTES.load(Ordering::Relaxed)
}

pub fn set_prefetch_cluster_bytes(value: u32) {
    PREFETCH_CLUSTER_BYTES.store(value, Ordering::Relaxed);
}

pub fn wait_for_device() -> bool {
    WAIT_FOR_DEVICE.load(Ordering::Relaxed)
}

pub fn set_wait_for_device(value: bool) {
    WAIT_FOR_DEVICE.store(value, Ordering::Relaxed);
}
