//! Counting semaphore.

use std::sync::{Condvar, Mutex, PoisonError};

/// Counting semaphore built on a mutex and a condition variable.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<u32>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits`.
    pub const fn new(permits: u32) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Adds one permit and wakes one waiter.
    pub fn post(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *permits = permits.saturating_add(1);
        self.available.notify_one();
    }

    /// Blocks until a permit is available and takes it.
    pub fn wait(&self) {
        let permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        let mut permits = self
            .available
            .wait_while(permits, |p| *p == 0)
            .unwrap_or_else(PoisonError::into_inner);
        *permits -= 1;
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
