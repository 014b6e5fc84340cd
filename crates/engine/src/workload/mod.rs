//! Workloads.
//!
//! A [`Workload`] bundles everything one characteristic produced:
//! 1. **Data Region:** The pointer-chase chain, if the workload touches data.
//! 2. **Code Region:** Generated instructions, or a fixed stub entry point.
//! 3. **Image:** An ELF description of both regions, optionally announced to a debugger.
//! 4. **Expected Counts:** What one call of the entry point should execute.
//!
//! Workloads are immutable after construction. They are handed out as
//! [`Owned`](crate::sync::Owned) handles so that running workers can keep a
//! replaced workload alive until they let go of it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::characteristic::Characteristic;
use crate::common::{Error, Result};
use crate::emit::{Layout, Tally};
use crate::image::{ImageDescriptor, Registration};
use crate::isa::Isa;
use crate::mem::{Chain, Region};

/// Construction pipeline.
pub mod build;

/// Program generation.
mod program;

/// Fixed stub entry points.
pub mod stubs;

/// Signature of every workload entry point.
///
/// The argument points to the caller's chain cursor; the entry point reads it
/// on entry and writes the advanced cursor back before returning.
pub type EntryFn = unsafe extern "C" fn(*mut *mut u8);

/// Origin of a workload's entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Generated machine code.
    Generated,
    /// The one-link [`stubs::chain_step`] stub.
    ChainStep,
    /// The empty [`stubs::nop`] stub.
    Nop,
}

/// A constructed workload.
pub struct Workload {
    // Declared first: the debugger must forget the image before its code is unmapped.
    registration: Option<Registration>,
    id: u64,
    isa: Isa,
    characteristic: Characteristic,
    chains: u32,
    image: ImageDescriptor,
    code: Option<Region>,
    layout: Option<Layout>,
    chain: Option<Chain>,
    entry: Option<EntryFn>,
    entry_kind: EntryKind,
    entry_addr: u64,
    expected: Tally,
    // Declared last: counts down once the regions are unmapped.
    _live: Liveness,
}

/// Membership in an engine's count of live workloads.
#[derive(Debug)]
pub(crate) struct Liveness(Arc<AtomicUsize>);

impl Liveness {
    /// Counts one more live workload on `counter`.
    pub(crate) fn enter(counter: &Arc<AtomicUsize>) -> Self {
        let _ = counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for Liveness {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Workload {
    /// Engine-assigned identifier.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Target instruction set.
    pub const fn isa(&self) -> Isa {
        self.isa
    }

    /// The characteristic this workload was built from.
    pub const fn characteristic(&self) -> &Characteristic {
        &self.characteristic
    }

    /// FP dependency chains actually generated.
    pub const fn chains(&self) -> u32 {
        self.chains
    }

    /// Origin of the entry point.
    pub const fn entry_kind(&self) -> EntryKind {
        self.entry_kind
    }

    /// Address of the entry point.
    pub const fn entry_addr(&self) -> u64 {
        self.entry_addr
    }

    /// Returns `true` if the entry point can be called on this host.
    pub const fn is_runnable(&self) -> bool {
        self.entry.is_some()
    }

    /// The callable entry point.
    ///
    /// # Errors
    ///
    /// [`Error::NotRunnable`] for workloads built for a foreign target.
    pub fn entry(&self) -> Result<EntryFn> {
        self.entry.ok_or(Error::NotRunnable(self.isa.name()))
    }

    /// Initial value of the chain cursor (null without a data region).
    pub fn initial_cursor(&self) -> *mut u8 {
        self.chain.as_ref().map_or(std::ptr::null_mut(), Chain::entry)
    }

    /// Calls the entry point `calls` times, carrying `cursor` across calls.
    ///
    /// # Errors
    ///
    /// [`Error::NotRunnable`] for workloads built for a foreign target.
    pub fn run(&self, cursor: &mut *mut u8, calls: u32) -> Result<()> {
        let entry = self.entry()?;
        for _ in 0..calls {
            // SAFETY: the entry point was generated for this host, made
            // executable, and `cursor` starts at (and stays on) the chain.
            unsafe { entry(cursor) };
        }
        Ok(())
    }

    /// Expected counts of one entry-point call.
    pub const fn expected(&self) -> &Tally {
        &self.expected
    }

    /// Generated code region, if code was generated.
    pub const fn code(&self) -> Option<&Region> {
        self.code.as_ref()
    }

    /// Placement of the generated code.
    pub const fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    /// Generated code bytes from the lowest used line to the end of the region.
    pub fn code_bytes(&self) -> &[u8] {
        match (&self.code, &self.layout) {
            (Some(code), Some(layout)) => &code.as_slice()[layout.low..],
            _ => &[],
        }
    }

    /// Pointer-chase chain, if the workload has a data region.
    pub const fn chain(&self) -> Option<&Chain> {
        self.chain.as_ref()
    }

    /// Image descriptor of the workload.
    pub const fn image(&self) -> &ImageDescriptor {
        &self.image
    }

    /// Returns `true` if the image is registered with a debugger.
    pub fn is_registered(&self) -> bool {
        self.registration.as_ref().is_some_and(Registration::is_active)
    }
}

impl fmt::Debug for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workload")
            .field("id", &self.id)
            .field("isa", &self.isa)
            .field("entry_kind", &self.entry_kind)
            .field("entry_addr", &format_args!("{:#x}", self.entry_addr))
            .field("runnable", &self.is_runnable())
            .field("code", &self.code.as_ref().map(Region::len))
            .field("nodes", &self.chain.as_ref().map(Chain::nodes))
            .finish_non_exhaustive()
    }
}

impl Drop for Workload {
    fn drop(&mut self) {
        tracing::debug!(workload = self.id, "workload destroyed");
    }
}
