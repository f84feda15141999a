//! Named backing region: a POSIX shared-memory mapping two processes can
//! open by name and agree on.
//!
//! This replaces the teacher's `memfd_create`-based `LinuxSharedMemory`: a
//! memfd has no name a second, unrelated process can open it by, so the
//! teacher's own `attach()` is a documented stub. `shm_open` gives the real
//! cross-process "create or open by name" semantics spec.md §4.4 requires.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// POSIX permission bits threaded through to `shm_open`/`sem_open`. Stands
/// in for the ACL-construction collaborator spec.md §1 places out of scope.
#[derive(Debug, Clone, Copy)]
pub struct Acl(pub u32);

impl Default for Acl {
    fn default() -> Self {
        Acl(0o600)
    }
}

/// A mapped, named shared-memory region.
pub struct Region {
    ptr: NonNull<u8>,
    size: usize,
    fd: RawFd,
    owner: bool,
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Create a new named region, failing if one already exists under `name`.
    #[cfg(target_os = "linux")]
    pub fn create(name: &str, size: usize, acl: Acl) -> Result<Self> {
        let c_name = CString::new(name).expect("channel name must not contain NUL");
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                acl.0,
            )
        };
        if fd < 0 {
            return Err(Error::from_setup_errno(name));
        }
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = Error::from_setup_errno(name);
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let region = Self::map(fd, size, true)?;
        tracing::debug!(name, size, "created named region");
        Ok(region)
    }

    /// Open an existing named region. Fails with `ObjectDoesNotExist` if
    /// `name` was never created.
    #[cfg(target_os = "linux")]
    pub fn open(name: &str, size: usize) -> Result<Self> {
        let c_name = CString::new(name).expect("channel name must not contain NUL");
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(Error::from_setup_errno(name));
        }
        let region = Self::map(fd, size, false)?;
        tracing::debug!(name, size, "attached to named region");
        Ok(region)
    }

    /// Remove the name from the filesystem namespace. The mapping already
    /// held by this or any other process stays valid until unmapped; only a
    /// subsequent `open` of the same name will fail. Exposed for test and
    /// operator cleanup — never called automatically on `Drop`, since the
    /// region must outlive whichever of the two parties tears down first.
    #[cfg(target_os = "linux")]
    pub fn unlink(name: &str) -> io::Result<()> {
        let c_name = CString::new(name).expect("channel name must not contain NUL");
        let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn map(fd: RawFd, size: usize, owner: bool) -> Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = Error::Platform(io::Error::last_os_error());
            unsafe { libc::close(fd) };
            return Err(err);
        }
        Ok(Self {
            ptr: NonNull::new(ptr as *mut u8).expect("mmap returned non-null on success"),
            size,
            fd,
            owner,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn create(_name: &str, _size: usize, _acl: Acl) -> Result<Self> {
        Err(Error::AccessDenied(
            "named shared memory is only implemented on Linux".into(),
        ))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(_name: &str, _size: usize) -> Result<Self> {
        Err(Error::AccessDenied(
            "named shared memory is only implemented on Linux".into(),
        ))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn unlink(_name: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "unsupported platform"))
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
            libc::close(self.fd);
        }
    }
}

impl crate::layout::RegionBytes for Region {
    fn as_mut_ptr(&self) -> *mut u8 {
        self.as_ptr()
    }

    fn len(&self) -> usize {
        self.size()
    }
}
