//! GDB JIT interface.
//!
//! Debuggers that implement the JIT compilation interface place a breakpoint on
//! `__jit_debug_register_code` and read `__jit_debug_descriptor` when it hits.
//! Each registered image is one entry of a doubly linked list hanging off the
//! descriptor. The descriptor is process-global by ABI, so every list update
//! happens under one mutex.
//!
//! Without the `gdb-jit` feature the symbols are not exported and
//! [`Registration::register`] returns an inert registration.

#[cfg(feature = "gdb-jit")]
use std::ptr;
#[cfg(feature = "gdb-jit")]
use std::sync::{Mutex, PoisonError};

use tracing::debug;

#[cfg(feature = "gdb-jit")]
const JIT_NOACTION: u32 = 0;
#[cfg(feature = "gdb-jit")]
const JIT_REGISTER_FN: u32 = 1;
#[cfg(feature = "gdb-jit")]
const JIT_UNREGISTER_FN: u32 = 2;

// Fields are read by the debugger, not by Rust.
#[allow(dead_code)]
#[repr(C)]
struct JitCodeEntry {
    next_entry: *mut JitCodeEntry,
    prev_entry: *mut JitCodeEntry,
    symfile_addr: *const u8,
    symfile_size: u64,
}

#[cfg(feature = "gdb-jit")]
#[allow(dead_code)]
#[repr(C)]
struct JitDescriptor {
    version: u32,
    action_flag: u32,
    relevant_entry: *mut JitCodeEntry,
    first_entry: *mut JitCodeEntry,
}

#[cfg(feature = "gdb-jit")]
#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
static mut __jit_debug_descriptor: JitDescriptor = JitDescriptor {
    version: 1,
    action_flag: JIT_NOACTION,
    relevant_entry: ptr::null_mut(),
    first_entry: ptr::null_mut(),
};

/// Debugger breakpoint hook; must stay an out-of-line call.
#[cfg(feature = "gdb-jit")]
#[unsafe(no_mangle)]
#[inline(never)]
extern "C" fn __jit_debug_register_code() {
    std::hint::black_box(());
}

#[cfg(feature = "gdb-jit")]
static LOCK: Mutex<()> = Mutex::new(());

/// An image announced to an attached debugger; withdrawn on drop.
pub struct Registration {
    entry: *mut JitCodeEntry,
    symfile: Box<[u8]>,
}

// SAFETY: The entry is only dereferenced under `LOCK`, and the symbol file it
// points to is owned by the registration.
unsafe impl Send for Registration {}
// SAFETY: No method reads or writes through `&self`.
unsafe impl Sync for Registration {}

impl Registration {
    /// Announces `symfile` (a serialized image) to the debugger.
    ///
    /// The bytes are copied so the registration owns everything the debugger may read.
    pub fn register(symfile: &[u8]) -> Self {
        let symfile: Box<[u8]> = symfile.into();

        #[cfg(feature = "gdb-jit")]
        {
            let entry = Box::into_raw(Box::new(JitCodeEntry {
                next_entry: ptr::null_mut(),
                prev_entry: ptr::null_mut(),
                symfile_addr: symfile.as_ptr(),
                symfile_size: symfile.len() as u64,
            }));
            let _guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let descriptor = &raw mut __jit_debug_descriptor;
            // SAFETY: `entry` is a live allocation and the list is only touched under `LOCK`.
            unsafe {
                let first = (*descriptor).first_entry;
                (*entry).next_entry = first;
                if !first.is_null() {
                    (*first).prev_entry = entry;
                }
                (*descriptor).first_entry = entry;
                (*descriptor).relevant_entry = entry;
                (*descriptor).action_flag = JIT_REGISTER_FN;
                __jit_debug_register_code();
                (*descriptor).action_flag = JIT_NOACTION;
            }
            debug!(bytes = symfile.len(), "image registered with debugger");
            Self {
                entry,
                symfile,
            }
        }

        #[cfg(not(feature = "gdb-jit"))]
        {
            debug!("debugger registration compiled out");
            Self {
                entry: std::ptr::null_mut(),
                symfile,
            }
        }
    }

    /// Returns `true` if the image is linked into the debugger's list.
    pub fn is_active(&self) -> bool {
        !self.entry.is_null()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.entry.is_null() {
            return;
        }
        #[cfg(feature = "gdb-jit")]
        {
            let entry = self.entry;
            let _guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let descriptor = &raw mut __jit_debug_descriptor;
            // SAFETY: `entry` was linked by `register` and is unlinked exactly once, under `LOCK`.
            unsafe {
                let (prev, next) = ((*entry).prev_entry, (*entry).next_entry);
                if prev.is_null() {
                    (*descriptor).first_entry = next;
                } else {
                    (*prev).next_entry = next;
                }
                if !next.is_null() {
                    (*next).prev_entry = prev;
                }
                (*descriptor).relevant_entry = entry;
                (*descriptor).action_flag = JIT_UNREGISTER_FN;
                __jit_debug_register_code();
                (*descriptor).action_flag = JIT_NOACTION;
                (*descriptor).relevant_entry = ptr::null_mut();
                drop(Box::from_raw(entry));
            }
            debug!("image unregistered from debugger");
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.is_active())
            .field("bytes", &self.symfile.len())
            .finish()
    }
}
