//! Fixed entry points used when no code is generated.

use crate::emit::Tally;
use crate::isa::Class;

use super::EntryFn;

/// Does nothing.
///
/// # Safety
///
/// Always safe to call; `unsafe` only to match [`EntryFn`].
pub unsafe extern "C" fn nop(_cursor: *mut *mut u8) {}

/// Advances the cursor by one chain link.
///
/// # Safety
///
/// `cursor` must point to a chain pointer whose target holds the next link.
pub unsafe extern "C" fn chain_step(cursor: *mut *mut u8) {
    // SAFETY: guaranteed by the caller.
    unsafe {
        let at = cursor.read();
        cursor.write(at.cast::<*mut u8>().read_volatile());
    }
}

/// Entry point of `nop` as an [`EntryFn`].
pub const NOP: EntryFn = nop;

/// Entry point of `chain_step` as an [`EntryFn`].
pub const CHAIN_STEP: EntryFn = chain_step;

/// Nominal per-call counts of [`nop`]: the return.
pub fn nop_tally() -> Tally {
    let mut tally = Tally::default();
    tally.record(Class::Branch);
    tally
}

/// Nominal per-call counts of [`chain_step`]: read the cursor, follow the
/// link, write the cursor back, return.
pub fn chain_step_tally() -> Tally {
    let mut tally = Tally::default();
    tally.record(Class::Load(8));
    tally.record(Class::Load(8));
    tally.record(Class::Store(8));
    tally.record(Class::Branch);
    tally
}
