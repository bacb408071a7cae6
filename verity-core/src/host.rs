//! Host-environment capabilities the core needs but does not implement
//! itself (spec §9 "Design Notes"): rebooting/halting the host, delivering
//! kernel-visible events, and running work on a pool. Nothing here is
//! global — every verifier takes these by capability at construction, the
//! same way `kaspa_core`'s `Service`/`Notify` traits are supplied by the
//! caller rather than reached for as globals.

use crate::error::BlockKind;
use crate::policy::CorruptionEvent;

/// Halts or restarts the host. Implementations decide what that means in
/// their environment (panic the process, issue a real reboot syscall,
/// record the call for a test assertion).
pub trait HostHalt: Send + Sync {
    /// Persistent, non-transient corruption in `Panic` mode: halt with a
    /// diagnostic naming the device, block and kind.
    fn halt(&self, device: &str, block: u64, kind: BlockKind);

    /// `Restart` mode: reboot the host.
    fn reboot(&self, reason: &str);
}

/// Delivers a structured corruption event to the environment (a kernel
/// uevent, a log line, an in-memory `Vec` for tests).
pub trait HostEvents: Send + Sync {
    fn emit(&self, event: CorruptionEvent);
}

/// A pool workers run on. The dispatcher and prefetcher submit closures;
/// what thread they run on is the pool's business.
pub trait WorkerPool: Send + Sync {
    fn spawn(&self, task: Box<dyn FnOnce() + Send>);
}

/// A no-op [`HostHalt`] for tests that don't care about halting/rebooting,
/// beyond not panicking the test process.
#[derive(Default)]
pub struct NullHostHalt;

impl HostHalt for NullHostHalt {
    fn halt(&self, device: &str, block: u64, kind: BlockKind) {
        log::error!("verity: {device} {kind:?} block {block} is corrupted beyond recovery (halt suppressed)");
    }
    fn reboot(&self, reason: &str) {
        log::error!("verity: reboot requested: {reason} (suppressed)");
    }
}

/// A no-op [`HostEvents`] for tests.
#[derive(Default)]
pub struct NullHostEvents;

impl HostEvents for NullHostEvents {
    fn emit(&self, event: CorruptionEvent) {
        log::warn!("verity: corruption event {:?} block {} on {}", event.kind, event.block, event.device);
    }
}
