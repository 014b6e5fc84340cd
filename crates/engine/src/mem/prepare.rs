//! Code preparation.
//!
//! Turns a written code region into something the host can execute: the
//! pages become read+execute (never writable and executable at once), then
//! the instruction cache is made coherent with the freshly written bytes.

use tracing::debug;

use crate::common::Result;

use super::{Protection, Region};

/// Makes `region` executable and coherent with instruction fetch.
///
/// # Arguments
///
/// * `region` - A region holding finished machine code for the host.
///
/// # Returns
///
/// `Ok(())` once the code may be called, [`crate::Error::Protect`] or
/// [`crate::Error::CacheSync`] otherwise.
pub fn make_executable(region: &mut Region) -> Result<()> {
    region.protect(Protection::ReadExecute)?;
    sync_icache(region.as_ptr(), region.len())?;
    debug!(addr = region.addr(), bytes = region.len(), "code prepared");
    Ok(())
}

/// Synchronizes the instruction cache with `[start, start + len)`.
///
/// x86-64 keeps instruction fetch coherent with stores in hardware.
#[cfg(target_arch = "x86_64")]
pub fn sync_icache(_start: *const u8, _len: usize) -> Result<()> {
    Ok(())
}

/// Synchronizes the instruction cache with `[start, start + len)`.
///
/// Cleans the data cache to the point of unification, invalidates the
/// instruction cache over the range and synchronizes the pipeline, using the
/// line sizes reported by `CTR_EL0`.
#[cfg(target_arch = "aarch64")]
pub fn sync_icache(start: *const u8, len: usize) -> Result<()> {
    use std::arch::asm;

    let ctr: u64;
    // SAFETY: CTR_EL0 is readable from EL0 on every supported OS.
    unsafe { asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack, preserves_flags)) };
    let dline = 4usize << ((ctr >> 16) & 0xF);
    let iline = 4usize << (ctr & 0xF);
    let begin = start as usize;
    let end = begin + len;

    let mut addr = begin & !(dline - 1);
    while addr < end {
        // SAFETY: Cache maintenance by VA on our own mapped range.
        unsafe { asm!("dc cvau, {}", in(reg) addr, options(nostack, preserves_flags)) };
        addr += dline;
    }
    // SAFETY: Barrier instruction, no operands.
    unsafe { asm!("dsb ish", options(nostack, preserves_flags)) };

    let mut addr = begin & !(iline - 1);
    while addr < end {
        // SAFETY: Cache maintenance by VA on our own mapped range.
        unsafe { asm!("ic ivau, {}", in(reg) addr, options(nostack, preserves_flags)) };
        addr += iline;
    }
    // SAFETY: Barrier instructions, no operands.
    unsafe { asm!("dsb ish", "isb", options(nostack, preserves_flags)) };
    Ok(())
}

/// Synchronizes the instruction cache with `[start, start + len)`.
///
/// Uses the kernel's cross-hart flush so workers on other harts observe the code.
#[cfg(all(target_arch = "riscv64", target_os = "linux"))]
pub fn sync_icache(start: *const u8, len: usize) -> Result<()> {
    let end = start as usize + len;
    // SAFETY: riscv_flush_icache only reads its arguments.
    let rc = unsafe { libc::syscall(libc::SYS_riscv_flush_icache, start as usize, end, 0usize) };
    if rc != 0 {
        return Err(crate::Error::CacheSync);
    }
    Ok(())
}

/// Synchronizes the instruction cache with `[start, start + len)`.
///
/// Hosts without a known cache maintenance sequence refuse, so unsafe code is
/// never handed out.
#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    all(target_arch = "riscv64", target_os = "linux")
)))]
pub fn sync_icache(_start: *const u8, _len: usize) -> Result<()> {
    Err(crate::Error::CacheSync)
}
