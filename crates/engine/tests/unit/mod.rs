//! # Unit Components
//!
//! Tests for each engine component, from the instruction encoders up to the
//! worker pool.


/// Workload characteristic parsing and validation.
pub mod characteristic;


/// Code stream stitching and expected-count accounting.
pub mod emit;


/// ELF image descriptor.
pub mod image;


/// Workload construction.
pub mod workload;

/// Worker pool, hot-swap and suspension.
pub mod pool;
