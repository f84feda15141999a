//! A single-writer/single-reader cross-process message queue backed by
//! named shared memory: a writer appends variable-length byte messages, a
//! reader consumes them in FIFO order, and both sides observe a consistent
//! view of a linked-list allocator embedded in the mapped region.

pub mod alloc;
pub mod channel;
mod debug;
pub mod error;
pub mod layout;
pub mod queue;

pub mod core;

pub use channel::{Channel, ChannelConfig, Diagnostics, Direction, Outcome, Scope, DEFAULT_CAPACITY};
pub use core::region::Acl;
pub use core::sync::CancelToken;
pub use error::{Error, Result};
pub use queue::{CallbackStatus, ChannelState, OpStatus};
