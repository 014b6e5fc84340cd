//! Suspension reasons.
//!
//! Workers are suspended while at least one reason is asserted. Only the
//! edges matter: the first asserted reason parks the workers, retracting the
//! last one resumes them. Asserting a reason twice or retracting one that is
//! not set changes nothing.

use std::fmt;

/// Why the pool is suspended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reason {
    /// Requested by the caller.
    Explicit = 1 << 0,
    /// The last affinity request named no CPU.
    EmptyAffinity = 1 << 1,
    /// The last rebuild failed.
    BuildFailed = 1 << 2,
}

impl Reason {
    /// Every reason.
    pub const ALL: [Self; 3] = [Self::Explicit, Self::EmptyAffinity, Self::BuildFailed];

    const fn bit(self) -> u8 {
        self as u8
    }
}

/// Effect of a change to the reason set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum Transition {
    /// The set went from empty to non-empty; park the workers.
    Park,
    /// The set went from non-empty to empty; resume the workers.
    Resume,
    /// The suspended state did not change.
    Unchanged,
}

/// Set of asserted suspension reasons.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Suspension {
    bits: u8,
}

impl Suspension {
    /// Asserts `reason`.
    pub fn assert(&mut self, reason: Reason) -> Transition {
        let before = self.bits;
        self.bits |= reason.bit();
        if before == 0 && self.bits != 0 {
            Transition::Park
        } else {
            Transition::Unchanged
        }
    }

    /// Retracts `reason`.
    pub fn retract(&mut self, reason: Reason) -> Transition {
        let before = self.bits;
        self.bits &= !reason.bit();
        if before != 0 && self.bits == 0 {
            Transition::Resume
        } else {
            Transition::Unchanged
        }
    }

    /// Returns `true` if `reason` is asserted.
    pub const fn contains(self, reason: Reason) -> bool {
        self.bits & reason.bit() != 0
    }

    /// Returns `true` if any reason is asserted.
    pub const fn is_suspended(self) -> bool {
        self.bits != 0
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(Reason::ALL.iter().filter(|r| self.contains(**r)))
            .finish()
    }
}
