//! The closed status taxonomy every public operation resolves to.
//!
//! Expected outcomes (`QueueIsEmpty`, `OutOfSpace`, `Timeout`, `Cancelled`,
//! `DelegateFailed`) are not exceptional — callers are expected to match on
//! them. Setup errors abort the session; per-operation errors leave the
//! channel in a consistent, fully-rolled-back-or-fully-committed state.

use std::io;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// The closed status taxonomy of the engine (spec §7).
///
/// `Completed` has no variant here: a successful operation is `Ok(_)`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `read` was attempted while `head_node == -1`.
    #[error("queue is empty")]
    QueueIsEmpty,

    /// `write` could not be satisfied by the free list or the high-water mark.
    #[error("no space left in region")]
    OutOfSpace,

    /// A blocking wait expired before the condition was observed.
    #[error("operation timed out")]
    Timeout,

    /// A blocking wait's cancel handle fired, or the user callback reported cancellation.
    #[error("operation was cancelled")]
    Cancelled,

    /// A registration lock (`_ws` or `_rs`) was already held by another process.
    #[error("object already in use")]
    ObjectAlreadyInUse,

    /// `open_outbound`/`open_inbound` named a channel that was never created.
    #[error("object does not exist")]
    ObjectDoesNotExist,

    /// The OS rejected the caller against the channel's access control list.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Global-scope creation required privilege the caller does not have.
    #[error("elevation required for global scope")]
    ElevationRequired,

    /// The requested capacity cannot be represented as a region offset on this platform.
    #[error("capacity is greater than logical address space")]
    CapacityIsGreaterThanLogicalAddressSpace,

    /// The requested message length cannot be represented as a region offset on this platform.
    #[error("requested length is greater than logical address space")]
    RequestedLengthIsGreaterThanLogicalAddressSpace,

    /// The requested message length is representable but cannot be mapped into
    /// this process's virtual address space.
    #[error("requested length is greater than virtual address space")]
    RequestedLengthIsGreaterThanVirtualAddressSpace,

    /// The user-supplied read/write callback reported an unexpected failure.
    #[error("callback delegate failed: {0}")]
    DelegateFailed(String),

    /// The header or node graph violated an invariant (corrupt region).
    #[error("region invariant violated: {0}")]
    CorruptRegion(String),

    /// An OS call failed in a way none of the above variants model precisely.
    #[error("platform error: {0}")]
    Platform(#[source] io::Error),
}

impl Error {
    /// Maps the calling thread's `errno` (via `io::Error::last_os_error`) onto
    /// the setup-class variants that name specific OS outcomes.
    pub(crate) fn from_setup_errno(context: &str) -> Error {
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::AlreadyExists => Error::ObjectAlreadyInUse,
            io::ErrorKind::NotFound => Error::ObjectDoesNotExist,
            io::ErrorKind::PermissionDenied => Error::AccessDenied(context.to_string()),
            _ => Error::Platform(err),
        }
    }
}
