//! Synthetic CPU workload engine.
//!
//! This crate generates, runs and hot-swaps machine-code workloads with
//! precisely controlled architectural characteristics:
//! 1. **ISA:** Per-target instruction encoders (x86-64, AArch64, RV64) behind one trait.
//! 2. **Emission:** A cache-line stitched code stream that tallies expected counts.
//! 3. **Memory:** Code and data regions, pointer-chase chains, code preparation.
//! 4. **Image:** ELF descriptions of generated workloads, optionally announced to a debugger.
//! 5. **Workloads:** The construction pipeline from a [`Characteristic`] to a runnable [`Workload`].
//! 6. **Execution:** Reference-counted workloads run by a hot-swappable [`WorkerPool`].
//!
//! # Examples
//!
//! ```no_run
//! use synthload_core::{Characteristic, Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let characteristic = Characteristic::from_json(
//!     r#"{ "inst_footprint": 4096, "data_footprint": 65536, "fp_intensity": 4 }"#,
//! )
//! .unwrap();
//! let workload = engine.build(&characteristic).unwrap();
//! let pool = engine.start(2, workload.share()).unwrap();
//! pool.stop();
//! ```

/// Common types and constants (errors, limits, fault reporting).
pub mod common;
/// Engine configuration (defaults, validation).
pub mod config;
/// Workload characteristics (shape, parsing, validation).
pub mod characteristic;
/// Instruction set targets and encoders.
pub mod isa;
/// Code stream and expected-count accounting.
pub mod emit;
/// Memory regions, pointer-chase chains and code preparation.
pub mod mem;
/// ELF image descriptor and debugger registration.
pub mod image;
/// Workloads and their construction pipeline.
pub mod workload;
/// Counter reports.
pub mod report;
/// Reference counting and semaphores.
pub mod sync;
/// Worker threads, hot-swap and suspension.
pub mod pool;
/// Engine entry point.
pub mod engine;

/// Workload shape; parse with `Characteristic::from_json`.
pub use crate::characteristic::Characteristic;
/// Crate error type, recoverable emission error, result alias.
pub use crate::common::{EmitError, Error, Result};
/// Fault sink and the default `tracing` reporter.
pub use crate::common::{Fault, FaultReporter, LogReporter};
/// Engine settings; use `EngineConfig::default()` or deserialize from JSON.
pub use crate::config::EngineConfig;
/// Workload factory.
pub use crate::engine::Engine;
/// Instruction set selection.
pub use crate::isa::Isa;
/// Worker pool and suspension reasons.
pub use crate::pool::{Reason, WorkerPool};
/// Counter report.
pub use crate::report::CounterReport;
/// Workload handles.
pub use crate::sync::{Owned, Retired, Shared};
/// Constructed workload.
pub use crate::workload::{EntryKind, Workload};
