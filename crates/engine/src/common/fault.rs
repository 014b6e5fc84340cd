//! Fault reporting.
//!
//! Faults are conditions the caller should hear about even when the call that
//! caused them already returned an error: a rebuild that left workers suspended,
//! a worker whose affinity could not be applied, a stream that refused
//! unsupported encodings. The engine never writes to a global sink; it calls
//! the [`FaultReporter`] it was constructed with.

use std::fmt;

/// A condition reported through a [`FaultReporter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Workload construction failed.
    BuildFailed(String),
    /// The code stream rejected this many encodings.
    UnsupportedEncodings(u32),
    /// A worker could not be pinned.
    Affinity {
        /// Index of the worker.
        worker: usize,
        /// Raw error number.
        errno: i32,
    },
    /// The requested concurrency exceeded the register budget and was clamped.
    ConcurrencyClamped {
        /// Requested number of chains.
        requested: u32,
        /// Number of chains actually generated.
        granted: u32,
    },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildFailed(reason) => write!(f, "workload build failed: {reason}"),
            Self::UnsupportedEncodings(n) => write!(f, "{n} unsupported encodings"),
            Self::Affinity { worker, errno } => {
                write!(f, "worker {worker}: affinity failed (errno {errno})")
            }
            Self::ConcurrencyClamped { requested, granted } => {
                write!(f, "concurrency {requested} clamped to {granted}")
            }
        }
    }
}

/// Sink for [`Fault`]s.
pub trait FaultReporter: Send + Sync {
    /// Records one fault.
    fn report(&self, fault: &Fault);
}

impl<F> FaultReporter for F
where
    F: Fn(&Fault) + Send + Sync,
{
    fn report(&self, fault: &Fault) {
        self(fault);
    }
}

/// Default reporter: forwards every fault to `tracing` at `warn` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl FaultReporter for LogReporter {
    fn report(&self, fault: &Fault) {
        tracing::warn!(%fault, "fault");
    }
}
