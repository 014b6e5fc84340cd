//! Biased reference counting.
//!
//! A value is allocated with its count pre-seeded to [`CONSTRUCTION_BIAS`].
//! The constructing [`Owned`] handle holds the bias; every [`Shared`] handle
//! holds one count. Retiring the owner removes the whole bias in a single
//! `fetch_sub`, so the count can only reach zero once the owner is gone and
//! every shared reference has been released. Whichever thread performs the
//! decrement that produces zero destroys the value, exactly once.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering, fence};

use tracing::trace;

use crate::common::CONSTRUCTION_BIAS;

/// Heap cell holding a value and its reference count.
pub struct Counted<T> {
    count: AtomicUsize,
    value: T,
}

impl<T> Counted<T> {
    /// Current count; racy, for diagnostics and tests.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// The counted value.
    pub const fn value(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Counted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counted")
            .field("count", &self.count())
            .field("value", &self.value)
            .finish()
    }
}

/// Outcome of retiring an [`Owned`] handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum Retired {
    /// No shared reference remained; the value was destroyed by the caller.
    Destroyed,
    /// Shared references remain; the last of them destroys the value.
    Deferred,
}

/// Releases `by` counts from `cell`, destroying it on reaching zero.
///
/// # Safety
///
/// `cell` must have been produced by [`Owned::new`] and the caller must own `by` counts.
unsafe fn release<T>(cell: NonNull<Counted<T>>, by: usize) -> bool {
    // SAFETY: the caller owns `by` counts, so the cell is alive.
    let previous = unsafe { cell.as_ref() }.count.fetch_sub(by, Ordering::Release);
    debug_assert!(previous >= by, "reference count underflow");
    if previous != by {
        return false;
    }
    fence(Ordering::Acquire);
    // SAFETY: the count reached zero; no other handle can observe the cell.
    drop(unsafe { Box::from_raw(cell.as_ptr()) });
    true
}

/// Constructing owner of a counted value; holds the construction bias.
pub struct Owned<T> {
    cell: NonNull<Counted<T>>,
    _marker: PhantomData<Counted<T>>,
}

// SAFETY: handles only give out `&T` and the count is atomic.
unsafe impl<T: Send + Sync> Send for Owned<T> {}
// SAFETY: as above.
unsafe impl<T: Send + Sync> Sync for Owned<T> {}

impl<T> Owned<T> {
    /// Moves `value` to the heap with the count set to the construction bias.
    pub fn new(value: T) -> Self {
        let cell = Box::new(Counted {
            count: AtomicUsize::new(CONSTRUCTION_BIAS),
            value,
        });
        Self {
            cell: NonNull::from(Box::leak(cell)),
            _marker: PhantomData,
        }
    }

    /// Creates a shared reference.
    pub fn share(&self) -> Shared<T> {
        let _ = self.counted().count.fetch_add(1, Ordering::Relaxed);
        Shared {
            cell: self.cell,
            _marker: PhantomData,
        }
    }

    /// Number of shared references currently outstanding; racy.
    pub fn shared_count(&self) -> usize {
        self.counted().count().saturating_sub(CONSTRUCTION_BIAS)
    }

    /// Removes the construction bias.
    ///
    /// # Returns
    ///
    /// [`Retired::Destroyed`] if the value was destroyed by this call,
    /// [`Retired::Deferred`] if shared references keep it alive.
    pub fn retire(self) -> Retired {
        let cell = self.cell;
        std::mem::forget(self);
        // SAFETY: the owner holds exactly the bias.
        if unsafe { release(cell, CONSTRUCTION_BIAS) } {
            trace!("retired and destroyed");
            Retired::Destroyed
        } else {
            trace!("retired, destruction deferred");
            Retired::Deferred
        }
    }

    fn counted(&self) -> &Counted<T> {
        // SAFETY: the bias keeps the cell alive while `self` exists.
        unsafe { self.cell.as_ref() }
    }
}

impl<T> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.counted().value
    }
}

impl<T> Drop for Owned<T> {
    fn drop(&mut self) {
        // SAFETY: the owner holds exactly the bias and is dropped once.
        let _ = unsafe { release(self.cell, CONSTRUCTION_BIAS) };
    }
}

impl<T: fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(self.counted()).finish()
    }
}

/// Shared reference to a counted value; holds one count.
pub struct Shared<T> {
    cell: NonNull<Counted<T>>,
    _marker: PhantomData<Counted<T>>,
}

// SAFETY: handles only give out `&T` and the count is atomic.
unsafe impl<T: Send + Sync> Send for Shared<T> {}
// SAFETY: as above.
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

impl<T> Shared<T> {
    /// Address of the cell, for publication through an atomic slot.
    ///
    /// The returned pointer does not carry a count.
    pub fn as_ptr(this: &Self) -> *mut Counted<T> {
        this.cell.as_ptr()
    }

    /// Takes a new count on a cell known only by address.
    ///
    /// # Safety
    ///
    /// `cell` must point to a live cell and must stay alive until the
    /// increment completes, e.g. because the caller published it as a hazard
    /// that the releasing thread waits on.
    pub unsafe fn retain(cell: NonNull<Counted<T>>) -> Self {
        // SAFETY: liveness is guaranteed by the caller.
        let _ = unsafe { cell.as_ref() }.count.fetch_add(1, Ordering::Relaxed);
        Self {
            cell,
            _marker: PhantomData,
        }
    }

    /// Returns `true` if both handles refer to the same cell.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.cell == b.cell
    }

    fn counted(&self) -> &Counted<T> {
        // SAFETY: the count held by `self` keeps the cell alive.
        unsafe { self.cell.as_ref() }
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        let _ = self.counted().count.fetch_add(1, Ordering::Relaxed);
        Self {
            cell: self.cell,
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.counted().value
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // SAFETY: `self` holds one count and is dropped once.
        if unsafe { release(self.cell, 1) } {
            trace!("last shared reference destroyed value");
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(self.counted()).finish()
    }
}
