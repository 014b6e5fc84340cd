//! Worker Pool.
//!
//! One controller (the owner of the [`WorkerPool`]) and N worker threads that
//! call the current workload's entry point in batches:
//! 1. **Hot-Swap:** [`WorkerPool::swap`] publishes a new workload to every
//!    worker without stopping them and releases the old one once no worker
//!    can still adopt it.
//! 2. **Suspension:** Independent reasons ([`Reason`]) park the workers while
//!    any of them is asserted.
//! 3. **Affinity:** Every worker is pinned to the same CPU set; an empty set
//!    suspends the pool.
//! 4. **Rebuild:** A failed rebuild suspends the pool until a later one succeeds.
//! 5. **Teardown:** Stop is cooperative and observed at batch boundaries.

use std::fmt;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{debug, info, warn};

use crate::characteristic::Characteristic;
use crate::common::{Error, Fault, FaultReporter, Result};
use crate::engine::Engine;
use crate::sync::{Counted, Shared};
use crate::workload::Workload;

/// CPU affinity and thread ids.
pub mod affinity;

/// Suspension reasons.
pub mod suspend;

/// Worker threads.
mod worker;

pub use suspend::{Reason, Suspension, Transition};

use worker::{Worker, WorkerState};

/// Threads continuously running one workload.
pub struct WorkerPool {
    workers: Vec<Worker>,
    stop: Arc<AtomicBool>,
    current: Option<Shared<Workload>>,
    suspension: Suspension,
    reporter: Arc<dyn FaultReporter>,
    batch: u32,
}

impl WorkerPool {
    /// Spawns `workers` threads and publishes `workload` to them.
    ///
    /// Returns once every worker is running.
    ///
    /// # Errors
    ///
    /// [`Error::NotRunnable`] if `workload` targets a foreign instruction set,
    /// [`Error::Spawn`] if a thread could not be created (already started
    /// workers are stopped).
    pub fn start(engine: &Engine, workers: usize, workload: Shared<Workload>) -> Result<Self> {
        let _ = workload.entry()?;
        let batch = engine.config().batch;
        let mut pool = Self {
            workers: Vec::with_capacity(workers),
            stop: Arc::new(AtomicBool::new(false)),
            current: None,
            suspension: Suspension::default(),
            reporter: engine.reporter(),
            batch,
        };
        for index in 0..workers {
            let state = Arc::new(WorkerState::default());
            let stop = Arc::clone(&pool.stop);
            let thread_state = Arc::clone(&state);
            let handle = thread::Builder::new()
                .name(format!("synthload-{index}"))
                .spawn(move || worker::run(index, &thread_state, &stop, batch))
                .map_err(|source| Error::Spawn { index, source })?;
            pool.workers.push(Worker {
                state,
                handle: Some(handle),
            });
        }
        for worker in &pool.workers {
            worker.state.ready.wait();
        }
        info!(workers, workload = workload.id(), "pool started");
        pool.publish(Shared::as_ptr(&workload));
        pool.current = Some(workload);
        Ok(pool)
    }

    /// Replaces the running workload.
    ///
    /// Returns after the pool's reference to the previous workload was
    /// released; workers still running it let go at their next batch boundary.
    ///
    /// # Errors
    ///
    /// [`Error::NotRunnable`] if `workload` targets a foreign instruction set.
    pub fn swap(&mut self, workload: Shared<Workload>) -> Result<()> {
        let _ = workload.entry()?;
        let next = Shared::as_ptr(&workload);
        let previous = self.current.replace(workload);
        if !self.suspension.is_suspended() {
            self.publish(next);
        }
        if let Some(previous) = previous {
            self.quiesce(Shared::as_ptr(&previous));
            debug!(from = previous.id(), "workload swapped out");
        }
        Ok(())
    }

    /// Suspends the pool for the caller.
    pub fn suspend(&mut self) {
        self.suspend_for(Reason::Explicit);
    }

    /// Retracts the caller's suspension.
    pub fn resume(&mut self) {
        self.resume_for(Reason::Explicit);
    }

    /// Asserts `reason`; parks the workers if it is the first one.
    pub fn suspend_for(&mut self, reason: Reason) {
        if self.suspension.assert(reason) == Transition::Park {
            debug!(?reason, "pool suspended");
            self.publish(ptr::null_mut());
        }
    }

    /// Retracts `reason`; resumes the workers if it was the last one.
    pub fn resume_for(&mut self, reason: Reason) {
        if self.suspension.retract(reason) == Transition::Resume {
            debug!(?reason, "pool resumed");
            let current = self.current.as_ref().map_or(ptr::null_mut(), Shared::as_ptr);
            self.publish(current);
        }
    }

    /// Asserted suspension reasons.
    pub const fn suspension(&self) -> Suspension {
        self.suspension
    }

    /// Returns `true` while any suspension reason is asserted.
    pub const fn is_suspended(&self) -> bool {
        self.suspension.is_suspended()
    }

    /// Pins every worker to `cpus`; an empty set suspends the pool.
    ///
    /// # Errors
    ///
    /// [`Error::Affinity`] for the first worker the kernel refused to pin.
    /// Every failure is also reported as [`Fault::Affinity`].
    pub fn set_affinity(&mut self, cpus: &[usize]) -> Result<()> {
        if cpus.is_empty() {
            self.suspend_for(Reason::EmptyAffinity);
            return Ok(());
        }
        let mut first = None;
        for (index, worker) in self.workers.iter().enumerate() {
            let Some(handle) = &worker.handle else {
                continue;
            };
            if let Err(errno) = affinity::pin(handle, cpus) {
                warn!(worker = index, errno, "affinity rejected");
                self.reporter.report(&Fault::Affinity { worker: index, errno });
                let _ = first.get_or_insert(Error::Affinity { index, errno });
            }
        }
        self.resume_for(Reason::EmptyAffinity);
        first.map_or(Ok(()), Err)
    }

    /// Builds a replacement from `characteristic` and swaps it in.
    ///
    /// A failure asserts [`Reason::BuildFailed`] and reports
    /// [`Fault::BuildFailed`]; the next successful rebuild retracts it.
    ///
    /// # Errors
    ///
    /// The construction error, or [`Error::NotRunnable`] for a foreign target.
    pub fn rebuild(&mut self, engine: &Engine, characteristic: &Characteristic) -> Result<()> {
        let replacement = engine.build(characteristic).and_then(|owned| {
            let shared = owned.share();
            let _ = owned.retire();
            let _ = shared.entry()?;
            Ok(shared)
        });
        match replacement {
            Ok(shared) => {
                self.swap(shared)?;
                self.resume_for(Reason::BuildFailed);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "rebuild failed, pool suspended");
                self.reporter.report(&Fault::BuildFailed(err.to_string()));
                self.suspend_for(Reason::BuildFailed);
                Err(err)
            }
        }
    }

    /// Workload the pool currently holds.
    pub const fn current(&self) -> Option<&Shared<Workload>> {
        self.current.as_ref()
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` if the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Kernel thread id of every worker.
    pub fn thread_ids(&self) -> Vec<i64> {
        self.workers
            .iter()
            .map(|w| w.state.tid.load(Ordering::Relaxed))
            .collect()
    }

    /// Completed entry-point calls of every worker.
    pub fn iterations(&self) -> Vec<u64> {
        self.workers
            .iter()
            .map(|w| w.state.iterations.load(Ordering::Relaxed))
            .collect()
    }

    /// Completed entry-point calls over all workers.
    pub fn total_iterations(&self) -> u64 {
        self.iterations().iter().sum()
    }

    /// Stops and joins every worker, then releases the pool's workload.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn publish(&self, workload: *mut Counted<Workload>) {
        for worker in &self.workers {
            worker.state.publish(workload);
        }
    }

    /// Waits until no worker is adopting `previous`.
    fn quiesce(&self, previous: *mut Counted<Workload>) {
        for worker in &self.workers {
            while worker.state.guards(previous) {
                std::hint::spin_loop();
            }
        }
    }

    fn shutdown(&mut self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        for worker in &self.workers {
            worker.state.wake.post();
        }
        for (index, worker) in self.workers.iter_mut().enumerate() {
            let Some(handle) = worker.handle.take() else {
                continue;
            };
            if handle.join().is_err() {
                warn!(worker = index, "worker panicked");
            }
        }
        self.current = None;
        info!(workers = self.workers.len(), "pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("current", &self.current.as_ref().map(|w| w.id()))
            .field("suspension", &self.suspension)
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}
