//! Engine entry point.
//!
//! The [`Engine`] holds the configuration and the fault reporter every
//! workload and pool it creates shares. It carries no other state besides a
//! counter for workload identifiers and a count of the workloads still alive,
//! so one engine can build concurrently from several threads.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::info;

use crate::characteristic::Characteristic;
use crate::common::{Fault, FaultReporter, LogReporter, Result};
use crate::config::EngineConfig;
use crate::pool::WorkerPool;
use crate::sync::{Owned, Shared};
use crate::workload::{Workload, build};

/// Workload factory.
pub struct Engine {
    config: EngineConfig,
    reporter: Arc<dyn FaultReporter>,
    next_id: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl Engine {
    /// Creates an engine that reports faults through `tracing`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Validation`] if `config` is out of range.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_reporter(config, Arc::new(LogReporter))
    }

    /// Creates an engine with a custom fault reporter.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Validation`] if `config` is out of range.
    pub fn with_reporter(config: EngineConfig, reporter: Arc<dyn FaultReporter>) -> Result<Self> {
        config.validate()?;
        let isa = config.target_isa()?;
        info!(isa = ?isa, line = config.line_size, "engine ready");
        Ok(Self {
            config,
            reporter,
            next_id: AtomicU64::new(1),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Active configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fault reporter shared with pools.
    pub fn reporter(&self) -> Arc<dyn FaultReporter> {
        Arc::clone(&self.reporter)
    }

    /// Forwards `fault` to the reporter.
    pub fn report(&self, fault: &Fault) {
        self.reporter.report(fault);
    }

    /// Builds a workload.
    ///
    /// # Errors
    ///
    /// Any construction error: validation, mapping, unsupported encodings,
    /// protection or cache maintenance.
    pub fn build(&self, characteristic: &Characteristic) -> Result<Owned<Workload>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let workload =
            build::build(&self.config, self.reporter.as_ref(), characteristic, id, &self.live)?;
        Ok(Owned::new(workload))
    }

    /// Number of workloads built by this engine that are not yet destroyed.
    ///
    /// A retired workload stays counted until the last worker lets go of it.
    pub fn live_workloads(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Starts `workers` threads running `workload`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotRunnable`] for foreign workloads,
    /// [`crate::Error::Spawn`] if a thread could not be created.
    pub fn start(&self, workers: usize, workload: Shared<Workload>) -> Result<WorkerPool> {
        WorkerPool::start(self, workers, workload)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("live", &self.live_workloads())
            .finish_non_exhaustive()
    }
}
