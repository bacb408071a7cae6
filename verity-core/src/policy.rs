//! Policy & reporting (component G).
//!
//! Tracks the sticky `hash_failed` flag and the saturating `corrupted_errs`
//! counter, emits structured corruption events through the host environment,
//! runs the notifier chain for `Notify` mode, and finally applies the
//! configured failure [`Mode`].
//!
//! Grounded on `verity_handle_err`/`verity_error` in the original dm-verity
//! driver: `hash_failed` and `corrupted_errs` map onto atomics here instead
//! of plain fields, since multiple verification-pool workers can race to
//! report the same or different blocks concurrently.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::BlockKind;
use crate::host::{HostEvents, HostHalt};

/// Saturation point for `corrupted_errs` (spec §3, "Failure counter").
pub const MAX_CORRUPTED_ERRS: u32 = 100;

/// Configured failure-response mode (spec §4.G / §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Eio,
    Logging,
    Restart,
    Panic,
    None,
    Notify,
}

impl Mode {
    /// Parse the global default mode from either a digit (`0..3`, matching
    /// the legacy `error_behavior` integer) or a textual name.
    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "0" => Some(Mode::Eio),
            "1" => Some(Mode::Panic),
            "2" => Some(Mode::None),
            "3" => Some(Mode::Notify),
            s if s.eq_ignore_ascii_case("eio") => Some(Mode::Eio),
            s if s.eq_ignore_ascii_case("panic") => Some(Mode::Panic),
            s if s.eq_ignore_ascii_case("none") => Some(Mode::None),
            s if s.eq_ignore_ascii_case("notify") => Some(Mode::Notify),
            _ => None,
        }
    }
}

/// A structured corruption event, delivered to [`HostEvents`] and (for
/// `Notify` mode) to every registered [`Notifier`].
#[derive(Debug, Clone)]
pub struct CorruptionEvent {
    pub kind: BlockKind,
    pub block: u64,
    pub device: String,
}

impl CorruptionEvent {
    /// The `KIND=<0|1>,<block>` wire form a kernel uevent or equivalent host
    /// notification channel delivers (spec §6, "Runtime event format").
    pub fn wire_format(&self) -> String {
        format!("KIND={},{}", self.kind as u8, self.block)
    }
}

/// The error-state record passed to notifiers in `Notify` mode (spec
/// §4.G.4).
#[derive(Debug, Clone)]
pub struct ErrorState {
    pub kind: BlockKind,
    pub block: u64,
    pub device: String,
    /// True when the digest engine succeeded but bytes mismatched; false
    /// when the digest/I/O engine itself failed.
    pub transient: bool,
    pub hash_volume_range: (u64, u64),
    pub data_volume_range: (u64, u64),
}

/// Outcome a [`Notifier`] may hand back: either it declines to handle the
/// event, or it substitutes a mode for the remainder of this single event.
#[derive(Debug, Clone, Copy)]
pub enum NotifierReply {
    Unhandled,
    Handled(Mode),
}

/// An out-of-process corruption notifier (spec §4.G.4). Implementations are
/// opaque collaborators reached only through this trait.
pub trait Notifier: Send + Sync {
    fn notify(&self, state: &ErrorState) -> NotifierReply;
}

/// What the policy engine decided to do with a single failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// The request should see an integrity error.
    Escalate,
    /// The request continues as if verification succeeded.
    Recovered,
}

pub struct PolicyEngine {
    mode: Mode,
    device_name: String,
    hash_failed: AtomicBool,
    corrupted_errs: AtomicU32,
    /// Reader-shared / writer-exclusive, matching the read-mostly discipline
    /// of `body_tips_store`/`statuses_store` in the teacher's block
    /// processor: registration is rare, every corruption event reads it.
    notifiers: RwLock<Vec<Arc<dyn Notifier>>>,
    events: Arc<dyn HostEvents>,
    halt: Arc<dyn HostHalt>,
}

impl PolicyEngine {
    pub fn new(mode: Mode, device_name: impl Into<String>, events: Arc<dyn HostEvents>, halt: Arc<dyn HostHalt>) -> Self {
        Self {
            mode,
            device_name: device_name.into(),
            hash_failed: AtomicBool::new(false),
            corrupted_errs: AtomicU32::new(0),
            notifiers: RwLock::new(Vec::new()),
            events,
            halt,
        }
    }

    pub fn register_notifier(&self, notifier: Arc<dyn Notifier>) {
        self.notifiers.write().push(notifier);
    }

    pub fn hash_failed(&self) -> bool {
        self.hash_failed.load(Ordering::Relaxed)
    }

    pub fn corrupted_errs(&self) -> u32 {
        self.corrupted_errs.load(Ordering::Relaxed)
    }

    /// Report a verification failure and apply the configured policy.
    /// `transient` distinguishes a digest/I/O engine fault from an actual
    /// content mismatch; only a non-transient failure may escalate to
    /// `Panic`.
    pub fn handle_failure(
        &self,
        kind: BlockKind,
        block: u64,
        transient: bool,
        hash_volume_range: (u64, u64),
        data_volume_range: (u64, u64),
    ) -> PolicyOutcome {
        // Corruption is visible in device status in every mode.
        self.hash_failed.store(true, Ordering::Relaxed);

        let previous = self.corrupted_errs.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
            if c < MAX_CORRUPTED_ERRS {
                Some(c + 1)
            } else {
                None
            }
        });
        let saturated = previous.is_err();

        if !saturated {
            self.events.emit(CorruptionEvent { kind, block, device: self.device_name.clone() });
        }

        let mut effective_mode = self.mode;
        if effective_mode == Mode::Notify {
            let state = ErrorState { kind, block, device: self.device_name.clone(), transient, hash_volume_range, data_volume_range };
            effective_mode = Mode::Panic; // default fallthrough per spec §4.G.4
            for notifier in self.notifiers.read().iter() {
                if let NotifierReply::Handled(substitute) = notifier.notify(&state) {
                    effective_mode = substitute;
                    break;
                }
            }
        }

        match effective_mode {
            Mode::Logging => PolicyOutcome::Recovered,
            Mode::Restart => {
                self.halt.reboot("verity device corrupted");
                PolicyOutcome::Escalate
            }
            Mode::Panic => {
                if transient {
                    PolicyOutcome::Escalate
                } else {
                    self.halt.halt(&self.device_name, block, kind);
                    PolicyOutcome::Escalate
                }
            }
            Mode::Eio | Mode::None | Mode::Notify => PolicyOutcome::Escalate,
        }
    }
}
