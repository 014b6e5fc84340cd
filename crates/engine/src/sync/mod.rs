//! Synchronization primitives.
//!
//! This module contains the two primitives the worker pool is built from:
//! 1. **Biased Reference Count:** [`Owned`] and [`Shared`] handles over a
//!    counted heap cell; the last release destroys the value exactly once.
//! 2. **Semaphore:** A counting semaphore for worker readiness and wake-ups.

/// Biased reference counting.
pub mod counted;

/// Counting semaphore.
pub mod semaphore;

pub use counted::{Counted, Owned, Retired, Shared};
pub use semaphore::Semaphore;
