//! Concrete [`WorkerPool`] implementations backing the verification and
//! prefetch pools (spec §5: "typically one worker per online CPU").
//!
//! Grounded directly on `BlockBodyProcessor::worker` in
//! `examples/kaspanet-rusty-kaspa/consensus/src/pipeline/body_processor/processor.rs`:
//! a dedicated thread drains a `crossbeam_channel::Receiver` and hands each
//! task to a `rayon::ThreadPool`, so the receive loop itself never blocks on
//! CPU-bound work.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPool;

use crate::host::WorkerPool;

type Task = Box<dyn FnOnce() + Send>;

/// The simplest [`WorkerPool`]: hands every task directly to a
/// `rayon::ThreadPool`. Adequate when the caller doesn't need the
/// channel-fed receive loop below (e.g. the prefetch pool, which the spec
/// allows to share the verification pool).
pub struct RayonWorkerPool {
    pool: Arc<ThreadPool>,
}

impl RayonWorkerPool {
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self { pool }
    }
}

impl WorkerPool for RayonWorkerPool {
    fn spawn(&self, task: Task) {
        self.pool.spawn(move || task());
    }
}

/// A channel-fed pool: `spawn` only sends the task down a bounded channel
/// (cheap, never blocks on CPU work); a dedicated receive thread drains the
/// channel and hands each task to the backing `rayon::ThreadPool`, mirroring
/// `BlockBodyProcessor::worker`'s `while let Ok(msg) = self.receiver.recv()`
/// loop. Dropping the pool closes the channel and joins the receive thread.
pub struct ChannelWorkerPool {
    sender: Option<Sender<Task>>,
    receiver_thread: Option<JoinHandle<()>>,
}

impl ChannelWorkerPool {
    pub fn new(pool: Arc<ThreadPool>, queue_capacity: usize) -> Self {
        let (sender, receiver): (Sender<Task>, Receiver<Task>) = bounded(queue_capacity);
        let receiver_thread = std::thread::spawn(move || {
            while let Ok(task) = receiver.recv() {
                pool.spawn(task);
            }
        });
        Self { sender: Some(sender), receiver_thread: Some(receiver_thread) }
    }
}

impl WorkerPool for ChannelWorkerPool {
    fn spawn(&self, task: Task) {
        match &self.sender {
            Some(sender) if sender.send(task).is_ok() => {}
            _ => log::warn!("verity: worker pool receive thread has shut down, dropping task"),
        }
    }
}

impl Drop for ChannelWorkerPool {
    fn drop(&mut self) {
        // Drop the sender first so the receive thread's `recv()` observes a
        // closed channel and exits its loop; only then join it, or this
        // would deadlock waiting for a thread that's still blocked on recv.
        self.sender.take();
        if let Some(handle) = self.receiver_thread.take() {
            let _ = handle.join();
        }
    }
}
