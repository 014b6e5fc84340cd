//! Worker threads.
//!
//! Each worker repeatedly observes its slot, adopts the published workload
//! and runs one batch of entry-point calls. A null slot makes it let go of
//! its workload and block on its wake semaphore.
//!
//! Adoption follows a hazard-pointer protocol so the controller never drops
//! the last reference to a workload a worker is about to retain:
//! 1. read the slot,
//! 2. publish the pointer as the worker's hazard,
//! 3. re-read the slot and give up if it changed,
//! 4. retain, then clear the hazard.
//!
//! The controller, after replacing a pointer in every slot, waits until no
//! hazard names the old pointer before releasing its own reference.

use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::sync::{Counted, Semaphore, Shared};
use crate::workload::Workload;

use super::affinity;

/// State shared between the controller and one worker.
#[derive(Debug, Default)]
pub(crate) struct WorkerState {
    /// Workload the controller wants this worker to run; null parks it.
    pub slot: AtomicPtr<Counted<Workload>>,
    /// Pointer the worker is in the middle of adopting.
    pub hazard: AtomicPtr<Counted<Workload>>,
    /// Posted by the controller after every slot change and at stop.
    pub wake: Semaphore,
    /// Posted once by the worker when it is running.
    pub ready: Semaphore,
    /// Completed entry-point calls.
    pub iterations: AtomicU64,
    /// Kernel thread id.
    pub tid: AtomicI64,
}

impl WorkerState {
    /// Publishes `workload` (or null) and wakes the worker.
    pub fn publish(&self, workload: *mut Counted<Workload>) {
        self.slot.store(workload, Ordering::SeqCst);
        self.wake.post();
    }

    /// Returns `true` while the worker is adopting `workload`.
    pub fn guards(&self, workload: *mut Counted<Workload>) -> bool {
        self.hazard.load(Ordering::SeqCst) == workload
    }

    fn adopt(&self, published: NonNull<Counted<Workload>>) -> Option<Shared<Workload>> {
        self.hazard.store(published.as_ptr(), Ordering::SeqCst);
        if self.slot.load(Ordering::SeqCst) != published.as_ptr() {
            self.hazard.store(ptr::null_mut(), Ordering::SeqCst);
            return None;
        }
        // SAFETY: the pointer was still published after the hazard became
        // visible, so the controller keeps its reference until the hazard clears.
        let shared = unsafe { Shared::retain(published) };
        self.hazard.store(ptr::null_mut(), Ordering::Release);
        Some(shared)
    }
}

/// Body of worker `index`.
pub(crate) fn run(index: usize, state: &WorkerState, stop: &AtomicBool, batch: u32) {
    state.tid.store(affinity::current_tid(), Ordering::Relaxed);
    state.ready.post();
    debug!(worker = index, "worker started");

    let mut held: Option<Shared<Workload>> = None;
    let mut cursor: *mut u8 = ptr::null_mut();
    while !stop.load(Ordering::Acquire) {
        let published = state.slot.load(Ordering::Acquire);
        let Some(target) = NonNull::new(published) else {
            if held.take().is_some() {
                trace!(worker = index, "parked, workload released");
            }
            state.wake.wait();
            continue;
        };
        if held.as_ref().is_none_or(|w| Shared::as_ptr(w) != published) {
            let Some(adopted) = state.adopt(target) else {
                continue;
            };
            trace!(worker = index, workload = adopted.id(), "workload adopted");
            cursor = adopted.initial_cursor();
            held = Some(adopted);
        }
        if let Some(workload) = &held {
            if let Err(err) = workload.run(&mut cursor, batch) {
                warn!(worker = index, %err, "workload not runnable, releasing");
                held = None;
                state.wake.wait();
                continue;
            }
            let _ = state.iterations.fetch_add(u64::from(batch), Ordering::Relaxed);
        }
    }
    drop(held);
    debug!(worker = index, "worker stopped");
}

/// Spawn-side handle to a worker.
#[derive(Debug)]
pub(crate) struct Worker {
    pub state: Arc<WorkerState>,
    pub handle: Option<std::thread::JoinHandle<()>>,
}
