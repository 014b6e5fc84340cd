//! CPU affinity.

use std::thread::JoinHandle;

/// Pins the thread behind `handle` to `cpus`.
///
/// # Returns
///
/// `Err(errno)` if the kernel rejected the mask.
#[cfg(target_os = "linux")]
pub fn pin<T>(handle: &JoinHandle<T>, cpus: &[usize]) -> Result<(), i32> {
    use std::os::unix::thread::JoinHandleExt;

    // SAFETY: `cpu_set_t` is plain data; all-zero is the empty set.
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    for &cpu in cpus {
        if cpu >= libc::CPU_SETSIZE as usize {
            return Err(libc::EINVAL);
        }
        // SAFETY: `cpu` is inside the set.
        unsafe { libc::CPU_SET(cpu, &mut set) };
    }
    // SAFETY: the pthread is alive while its join handle exists, and `set`
    // is a valid mask of the size passed.
    let rc = unsafe {
        libc::pthread_setaffinity_np(
            handle.as_pthread_t(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        )
    };
    if rc == 0 { Ok(()) } else { Err(rc) }
}

/// Pins the thread behind `handle` to `cpus`.
///
/// Affinity is not supported on this host; the request is ignored.
#[cfg(not(target_os = "linux"))]
pub fn pin<T>(_handle: &JoinHandle<T>, _cpus: &[usize]) -> Result<(), i32> {
    tracing::debug!("thread affinity is not supported on this host");
    Ok(())
}

/// Kernel id of the calling thread (0 where the host has none).
pub fn current_tid() -> i64 {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: gettid has no preconditions.
        unsafe { libc::syscall(libc::SYS_gettid) as i64 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}
