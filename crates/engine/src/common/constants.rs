//! Engine-wide constants.
//!
//! This module defines constants shared across the engine. It includes:
//! 1. **Memory Constants:** Pointer size and fallback page size.
//! 2. **Emission Constants:** Line granule and limits for generated code.
//! 3. **Lifecycle Constants:** The construction bias of the workload reference count.

/// Size of a chain pointer in bytes.
pub const POINTER_SIZE: usize = 8;

/// Page size assumed when the host does not report one.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// Line sizes must be a multiple of this granule.
pub const LINE_GRANULE: usize = 32;

/// Largest accepted line size.
///
/// Keeps the one-line prefetch distance inside every target's immediate
/// field (RV64 reaches 2047 bytes).
pub const MAX_LINE_SIZE: usize = 1024;

/// Bytes reserved behind a chain pointer for paired loads.
pub const MIN_SLOT_SPAN: usize = 16;

/// Upper bound on generated body code (256 MiB).
pub const MAX_INST_FOOTPRINT: usize = 256 << 20;

/// Upper bound on the data working set (64 GiB).
pub const MAX_DATA_FOOTPRINT: usize = 64 << 30;

/// Upper bound on the inner-loop trip count.
pub const MAX_LOOP_COUNT: u32 = 1 << 24;

/// Reference-count bias held by the constructing owner.
///
/// Any realistic number of concurrent references stays far below this value,
/// so the count cannot reach zero while the owner still holds the bias.
pub const CONSTRUCTION_BIAS: usize = 1 << 30;

/// Returns the host page size.
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    FALLBACK_PAGE_SIZE
}

/// Rounds `value` up to a multiple of `to` (`to` must be non-zero).
#[inline]
pub const fn round_up(value: usize, to: usize) -> usize {
    value.div_ceil(to) * to
}
