//! Anonymous Memory Regions.
//!
//! This module provides a safe wrapper around the raw page mappings that hold
//! generated code and chain data. On Unix systems regions come from anonymous
//! `mmap`, so large data footprints are only backed by host memory once the
//! chain constructor touches them. Protection can be switched from writable to
//! executable exactly once; after that the region is read-only to Rust code.

use std::io;
use std::ptr::NonNull;
use std::slice;

use tracing::debug;

use crate::common::{Error, Result, page_size, round_up};

/// Page protection of a [`Region`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protection {
    /// Readable and writable.
    ReadWrite,
    /// Readable and executable.
    ReadExecute,
}

/// A page-aligned anonymous mapping.
///
/// Regions start zeroed and writable. Rust code may only write them while they
/// are [`Protection::ReadWrite`]; generated code may write data regions at any
/// time through raw pointers handed out by [`Region::as_mut_ptr`].
pub struct Region {
    ptr: NonNull<u8>,
    size: usize,
    protection: Protection,
}

// SAFETY: A region is a plain owned mapping; concurrent access through raw
// pointers is governed by the generated code's own memory model.
unsafe impl Send for Region {}
// SAFETY: Shared references only permit reads through `as_slice`.
unsafe impl Sync for Region {}

impl Region {
    /// Maps a new zeroed region.
    ///
    /// # Arguments
    ///
    /// * `size` - Requested size in bytes; rounded up to whole pages.
    ///
    /// # Returns
    ///
    /// The mapped region, or [`Error::Map`] if the host refused the mapping.
    pub fn map(size: usize) -> Result<Self> {
        let size = round_up(size.max(1), page_size());

        #[cfg(unix)]
        {
            // SAFETY: Anonymous private mapping with no address hint; the result is checked.
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(Error::Map {
                    size,
                    source: io::Error::last_os_error(),
                });
            }
            let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| Error::Map {
                size,
                source: io::Error::other("mmap returned null"),
            })?;
            debug!(size, addr = ptr.as_ptr() as usize, "region mapped");
            Ok(Self {
                ptr,
                size,
                protection: Protection::ReadWrite,
            })
        }

        #[cfg(not(unix))]
        {
            let mut vec = vec![0u8; size].into_boxed_slice();
            let ptr = NonNull::new(vec.as_mut_ptr()).ok_or_else(|| Error::Map {
                size,
                source: io::Error::other("allocation returned null"),
            })?;
            std::mem::forget(vec);
            Ok(Self {
                ptr,
                size,
                protection: Protection::ReadWrite,
            })
        }
    }

    /// Returns the size of the region in bytes.
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the region is empty (never, once mapped).
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the address of the first byte.
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Returns a raw pointer to the region.
    pub const fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Returns a mutable raw pointer to the region.
    pub const fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Current protection.
    pub const fn protection(&self) -> Protection {
        self.protection
    }

    /// Views the region as bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: The mapping is `size` bytes, readable under either protection.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// Views the region as mutable bytes.
    ///
    /// # Panics
    ///
    /// Panics if the region has been made executable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        assert_eq!(
            self.protection,
            Protection::ReadWrite,
            "region is no longer writable"
        );
        // SAFETY: The mapping is `size` bytes and writable; `&mut self` excludes aliases.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Reads a 64-bit word.
    ///
    /// # Panics
    ///
    /// Panics if the word is out of bounds or misaligned.
    pub fn read_u64(&self, offset: usize) -> u64 {
        assert!(offset + 8 <= self.size, "region read out of bounds");
        assert!(offset % 8 == 0, "misaligned region read");
        // SAFETY: In bounds and aligned (the base is page aligned).
        unsafe { self.ptr.as_ptr().add(offset).cast::<u64>().read_volatile() }
    }

    /// Writes a 64-bit word.
    ///
    /// # Panics
    ///
    /// Panics if the word is out of bounds, misaligned, or the region is executable.
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        assert!(offset + 8 <= self.size, "region write out of bounds");
        assert!(offset % 8 == 0, "misaligned region write");
        assert_eq!(self.protection, Protection::ReadWrite, "region is no longer writable");
        // SAFETY: In bounds, aligned and writable; `&mut self` excludes aliases.
        unsafe { self.ptr.as_ptr().add(offset).cast::<u64>().write(value) }
    }

    /// Changes the page protection of the whole region.
    ///
    /// # Arguments
    ///
    /// * `protection` - New protection.
    ///
    /// # Returns
    ///
    /// `Ok(())` on success, [`Error::Protect`] if the host refused the change.
    pub fn protect(&mut self, protection: Protection) -> Result<()> {
        #[cfg(unix)]
        {
            let prot = match protection {
                Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
                Protection::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
            };
            // SAFETY: The range is exactly our own page-aligned mapping.
            let rc = unsafe { libc::mprotect(self.ptr.as_ptr().cast(), self.size, prot) };
            if rc != 0 {
                return Err(Error::Protect {
                    size: self.size,
                    source: io::Error::last_os_error(),
                });
            }
            self.protection = protection;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            let _ = protection;
            Err(Error::Protect {
                size: self.size,
                source: io::Error::from(io::ErrorKind::Unsupported),
            })
        }
    }

    /// Asks the kernel to back the region with transparent huge pages.
    ///
    /// Best effort: refusal is logged and otherwise ignored.
    pub fn advise_huge_pages(&self) {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: Advisory call on our own mapping.
            let rc = unsafe { libc::madvise(self.ptr.as_ptr().cast(), self.size, libc::MADV_HUGEPAGE) };
            if rc != 0 {
                debug!(error = %io::Error::last_os_error(), "huge page advice refused");
            }
        }

        #[cfg(not(target_os = "linux"))]
        debug!("huge page advice not available on this host");
    }
}

impl Drop for Region {
    /// Unmaps the region.
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            // SAFETY: Unmapping our own mapping exactly once.
            let _ = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.size) };
        }

        #[cfg(not(unix))]
        {
            // SAFETY: Reconstructs the boxed slice leaked in `map`.
            let _ = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.size))
            };
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("size", &self.size)
            .field("protection", &self.protection)
            .finish()
    }
}
