//! Common utilities and types used throughout the engine.
//!
//! This module provides the building blocks shared by every component:
//! 1. **Constants:** Pointer size, page size, limits and the construction bias.
//! 2. **Error Handling:** The crate error type and the recoverable emission error.
//! 3. **Fault Reporting:** The injectable sink for build and worker faults.

/// Engine-wide constants.
pub mod constants;

/// Error types and the crate `Result` alias.
pub mod error;

/// Injectable fault reporting.
pub mod fault;

pub use constants::{CONSTRUCTION_BIAS, POINTER_SIZE, page_size, round_up};
pub use error::{EmitError, Error, Result};
pub use fault::{Fault, FaultReporter, LogReporter};
