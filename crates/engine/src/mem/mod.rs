//! Memory regions.
//!
//! This module owns every mapping a workload uses:
//! 1. **Regions:** Page-aligned anonymous mappings with controlled protection.
//! 2. **Chains:** Single-cycle pointer-chase chains over a data region.
//! 3. **Preparation:** Execute permission and instruction-cache coherence.

/// Pointer-chase chain construction and verification.
pub mod chain;

/// Making generated code executable.
pub mod prepare;

/// Anonymous page mappings.
pub mod region;

pub use chain::{Chain, ChainParams, Walk};
pub use region::{Protection, Region};
