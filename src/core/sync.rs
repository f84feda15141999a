//! Named cross-process synchronization primitives (spec.md §4.4, §5).
//!
//! Two shapes cover the six named primitives:
//! - [`CountingLock`] (named POSIX semaphore, initial count 1) backs the
//!   `_ws`, `_rs` and `_eas` suffixes.
//! - [`ManualResetEvent`] (a one-page named shared-memory flag + futex)
//!   backs `_hme`, `_nme` and `_cce`.
//!
//! Composing a kernel wait with an optional [`CancelToken`] (spec.md §5's
//! "helper that takes a signal and a cancel handle") is done by slicing the
//! wait into short intervals and re-checking the cancel token between
//! slices, since neither `sem_timedwait` nor the futex syscall accepts a
//! second wakeup source. The slice bound is [`POLL_SLICE`].

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::futex::{futex_wait, futex_wake_all, WaitResult};
use crate::core::region::Acl;
use crate::error::{Error, Result};

/// Upper bound on a single blocking-primitive poll slice, so a cancel token
/// fired mid-wait is observed with bounded latency.
const POLL_SLICE: Duration = Duration::from_millis(20);

/// Outcome of a composed wait (spec.md §5: "three outcomes are distinguished").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Completed,
    Timeout,
    Cancelled,
}

/// A cooperative cancellation handle shared between the waiter and whoever
/// decides to cancel it. Modeled on the teacher's `Arc<AtomicBool>`
/// keep-alive flags in `Producer`/`Consumer`.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Runs `attempt` in a loop, sleeping [`POLL_SLICE`]-bounded intervals, until
/// it returns `true`, `timeout` elapses, or `cancel` fires.
fn poll_until(
    timeout: Option<Duration>,
    cancel: Option<&CancelToken>,
    mut attempt: impl FnMut() -> bool,
) -> Wait {
    let start = Instant::now();
    loop {
        if attempt() {
            return Wait::Completed;
        }
        if let Some(c) = cancel {
            if c.is_cancelled() {
                return Wait::Cancelled;
            }
        }
        if let Some(t) = timeout {
            let elapsed = start.elapsed();
            if elapsed >= t {
                return Wait::Timeout;
            }
            std::thread::sleep(std::cmp::min(POLL_SLICE, t - elapsed));
        } else {
            std::thread::sleep(POLL_SLICE);
        }
    }
}

/// A named binary semaphore: at most one holder across all processes.
pub struct CountingLock {
    #[cfg(target_os = "linux")]
    sem: *mut libc::sem_t,
    name: String,
}

unsafe impl Send for CountingLock {}
unsafe impl Sync for CountingLock {}

impl CountingLock {
    #[cfg(target_os = "linux")]
    pub fn create(name: &str, acl: Acl) -> Result<Self> {
        let c_name = CString::new(name).expect("lock name must not contain NUL");
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                acl.0,
                1u32,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(Error::from_setup_errno(name));
        }
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    #[cfg(target_os = "linux")]
    pub fn open(name: &str) -> Result<Self> {
        let c_name = CString::new(name).expect("lock name must not contain NUL");
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(Error::from_setup_errno(name));
        }
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Non-blocking acquire. Used for the one-shot writer/reader
    /// registration handshake (spec.md §4.4: "if the acquisition would
    /// block ... report `ObjectAlreadyInUse`").
    #[cfg(target_os = "linux")]
    pub fn try_acquire(&self) -> bool {
        unsafe { libc::sem_trywait(self.sem) == 0 }
    }

    /// Blocking acquire for the exclusive-access lock (spec.md §5).
    #[cfg(target_os = "linux")]
    pub fn acquire(&self, timeout: Option<Duration>, cancel: Option<&CancelToken>) -> Wait {
        poll_until(timeout, cancel, || self.try_acquire())
    }

    #[cfg(target_os = "linux")]
    pub fn release(&self) {
        unsafe {
            libc::sem_post(self.sem);
        }
    }

    #[cfg(target_os = "linux")]
    pub fn unlink(name: &str) {
        if let Ok(c_name) = CString::new(name) {
            unsafe {
                libc::sem_unlink(c_name.as_ptr());
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn create(_name: &str, _acl: Acl) -> Result<Self> {
        Err(Error::AccessDenied(
            "named semaphores are only implemented on Linux".into(),
        ))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(_name: &str) -> Result<Self> {
        Err(Error::AccessDenied(
            "named semaphores are only implemented on Linux".into(),
        ))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn try_acquire(&self) -> bool {
        false
    }

    #[cfg(not(target_os = "linux"))]
    pub fn acquire(&self, _timeout: Option<Duration>, _cancel: Option<&CancelToken>) -> Wait {
        Wait::Timeout
    }

    #[cfg(not(target_os = "linux"))]
    pub fn release(&self) {}

    #[cfg(not(target_os = "linux"))]
    pub fn unlink(_name: &str) {}

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CountingLock {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

/// A named manual-reset event: a shared flag, set or clear, backed by a
/// one-page shared-memory segment so a futex wait in one process is woken
/// by a futex wake in another.
pub struct ManualResetEvent {
    region: crate::core::region::Region,
}

unsafe impl Send for ManualResetEvent {}
unsafe impl Sync for ManualResetEvent {}

const EVENT_REGION_SIZE: usize = 4096;

impl ManualResetEvent {
    pub fn create(name: &str, initially_set: bool, acl: Acl) -> Result<Self> {
        let region = crate::core::region::Region::create(name, EVENT_REGION_SIZE, acl)?;
        let event = Self { region };
        event.flag().store(initially_set as u32, Ordering::Release);
        Ok(event)
    }

    pub fn open(name: &str) -> Result<Self> {
        let region = crate::core::region::Region::open(name, EVENT_REGION_SIZE)?;
        Ok(Self { region })
    }

    fn flag(&self) -> &AtomicU32 {
        unsafe { &*(self.region.as_ptr() as *const AtomicU32) }
    }

    pub fn set(&self) {
        self.flag().store(1, Ordering::Release);
        futex_wake_all(self.flag());
    }

    pub fn clear(&self) {
        self.flag().store(0, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag().load(Ordering::Acquire) != 0
    }

    /// Waits for the event to become set, composing a futex wait with the
    /// optional timeout and cancel token.
    pub fn wait(&self, timeout: Option<Duration>, cancel: Option<&CancelToken>) -> Wait {
        if self.is_set() {
            return Wait::Completed;
        }
        let start = Instant::now();
        loop {
            let slice = match timeout {
                Some(t) => {
                    let elapsed = start.elapsed();
                    if elapsed >= t {
                        return Wait::Timeout;
                    }
                    std::cmp::min(POLL_SLICE, t - elapsed)
                }
                None => POLL_SLICE,
            };
            match futex_wait(self.flag(), 0, Some(slice)) {
                WaitResult::Woken | WaitResult::TimedOut => {
                    if self.is_set() {
                        return Wait::Completed;
                    }
                }
            }
            if let Some(c) = cancel {
                if c.is_cancelled() {
                    return Wait::Cancelled;
                }
            }
        }
    }

    pub fn unlink(name: &str) {
        let _ = crate::core::region::Region::unlink(name);
    }
}
