//! Linux futex wait/wake on a shared, process-mapped `AtomicU32`.
//!
//! Because the atomic lives in a `MAP_SHARED` mapping, the kernel's futex
//! table keys on the physical address, so a wait registered by one process is
//! woken by another process's `futex_wake` on the same mapped byte.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Outcome of a single futex wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The atomic's value changed (or a spurious wake occurred) before the timeout.
    Woken,
    /// The timeout elapsed with the atomic still equal to `expected`.
    TimedOut,
}

#[cfg(target_os = "linux")]
pub fn futex_wait(atomic: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitResult {
    use std::ptr;
    use std::sync::atomic::Ordering;

    if atomic.load(Ordering::Acquire) != expected {
        return WaitResult::Woken;
    }

    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map(|t| t as *const libc::timespec)
        .unwrap_or(ptr::null());

    // Deliberately *not* `FUTEX_PRIVATE_FLAG`: that flag tells the kernel to
    // hash the futex key assuming a single process's address space, which
    // breaks the wake/wait pairing across the two processes sharing this
    // mapping. The shared (non-private) futex ops are required here.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            ptr::null::<u32>(),
            0u32,
        )
    };

    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ETIMEDOUT) {
            return WaitResult::TimedOut;
        }
    }
    WaitResult::Woken
}

#[cfg(target_os = "linux")]
pub fn futex_wake_all(atomic: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wait(atomic: &AtomicU32, expected: u32, timeout: Option<Duration>) -> WaitResult {
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    let start = Instant::now();
    while atomic.load(Ordering::Acquire) == expected {
        if let Some(t) = timeout {
            if start.elapsed() >= t {
                return WaitResult::TimedOut;
            }
        }
        std::thread::yield_now();
    }
    WaitResult::Woken
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wake_all(_atomic: &AtomicU32) {}
