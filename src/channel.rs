//! Channel session & synchronization protocol (spec.md §4.4): the named
//! backing region plus the six named primitives derived from a channel
//! name, and the creation/opening/teardown protocol that wires them
//! together around the queue operations in [`crate::queue`].
//!
//! Grounded on `src/MPMC/builder.rs`'s attach-then-create fallback shape
//! (reused here for create-vs-open semantics) and the `Arc<AtomicBool>`
//! keep-alive pattern in `src/MPMC/producer.rs`/`consumer.rs`, generalized
//! into [`CancelToken`] and into the `_cce` client-connected signal.

use std::time::Duration;

use parking_lot::Mutex;

use crate::core::region::{Acl, Region};
use crate::core::sync::{CancelToken, CountingLock, ManualResetEvent, Wait};
use crate::error::{Error, Result};
use crate::layout::{read_header, write_header, Header, HEADER_SIZE};
use crate::queue::{self, CallbackStatus, ChannelState, OpStatus};

/// Which end of the channel a session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The sole writer; registers on `_ws`.
    Outbound,
    /// The sole reader; registers on `_rs`.
    Inbound,
}

/// Kernel-namespace visibility of the named primitives (spec.md §6).
///
/// Realized on this POSIX target as a name-prefix distinction only — see
/// `SPEC_FULL.md` §C: POSIX shared memory and named semaphores carry no
/// kernel-namespace privilege requirement analogous to Windows' `Global\`
/// prefix, so `Scope::Global` never raises `ElevationRequired` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Global,
}

impl Scope {
    fn prefix(self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Global => "global",
        }
    }
}

/// Default capacity suggested by spec.md §6.
pub const DEFAULT_CAPACITY: i64 = 1 << 30;

/// Parameters for creating or opening a channel (spec.md §4.4, §6).
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub capacity: i64,
    pub scope: Scope,
    pub acl: Acl,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            scope: Scope::Local,
            acl: Acl::default(),
        }
    }
}

/// The `{state, status}` pair every queue operation returns (spec.md §6's
/// public API shape).
#[derive(Debug, Clone)]
pub struct Outcome {
    pub state: ChannelState,
    pub status: OpStatus,
}

fn primitive_name(scope: Scope, name: &str, suffix: &str) -> String {
    format!("/{}_{}{}", scope.prefix(), name, suffix)
}

fn wait_to_result(wait: Wait) -> Result<()> {
    match wait {
        Wait::Completed => Ok(()),
        Wait::Timeout => Err(Error::Timeout),
        Wait::Cancelled => Err(Error::Cancelled),
    }
}

/// A live channel session: a mapped region plus handles to the six named
/// primitives derived from its name.
pub struct Channel {
    name: String,
    scope: Scope,
    capacity: i64,
    direction: Direction,
    ws: CountingLock,
    rs: CountingLock,
    hme: ManualResetEvent,
    nme: ManualResetEvent,
    cce: ManualResetEvent,
    eas: CountingLock,
    // Serializes header read-modify-write against other threads in this
    // process; cross-process exclusion is `eas` itself.
    header_guard: Mutex<()>,
    // Declared last: fields drop in declaration order, and the region view
    // must outlive every handle above it (spec.md §9 Design Notes teardown
    // order).
    region: Region,
}

impl Channel {
    fn registration_lock(&self) -> &CountingLock {
        match self.direction {
            Direction::Outbound => &self.ws,
            Direction::Inbound => &self.rs,
        }
    }

    fn create(name: &str, config: ChannelConfig, direction: Direction) -> Result<Self> {
        assert!(!name.is_empty(), "channel name must not be empty");
        assert!(
            config.capacity >= HEADER_SIZE as i64,
            "capacity must be at least HEADER_SIZE ({HEADER_SIZE})"
        );

        let mmf_name = primitive_name(config.scope, name, "_mmf");
        let region = Region::create(&mmf_name, config.capacity as usize, config.acl)?;
        write_header(&region, Header::formatted(config.capacity));

        let ws = CountingLock::create(&primitive_name(config.scope, name, "_ws"), config.acl)?;
        let rs = CountingLock::create(&primitive_name(config.scope, name, "_rs"), config.acl)?;
        let eas = CountingLock::create(&primitive_name(config.scope, name, "_eas"), config.acl)?;
        let hme = ManualResetEvent::create(
            &primitive_name(config.scope, name, "_hme"),
            false,
            config.acl,
        )?;
        let nme = ManualResetEvent::create(
            &primitive_name(config.scope, name, "_nme"),
            true,
            config.acl,
        )?;
        let cce = ManualResetEvent::create(
            &primitive_name(config.scope, name, "_cce"),
            false,
            config.acl,
        )?;

        let channel = Self {
            name: name.to_string(),
            scope: config.scope,
            capacity: config.capacity,
            direction,
            ws,
            rs,
            hme,
            nme,
            cce,
            eas,
            header_guard: Mutex::new(()),
            region,
        };

        if !channel.registration_lock().try_acquire() {
            return Err(Error::ObjectAlreadyInUse);
        }

        tracing::info!(
            name,
            capacity = config.capacity,
            direction = ?direction,
            "created channel"
        );
        Ok(channel)
    }

    fn open(name: &str, scope: Scope, direction: Direction) -> Result<Self> {
        assert!(!name.is_empty(), "channel name must not be empty");

        let mmf_name = primitive_name(scope, name, "_mmf");
        // The capacity isn't known until the header is read; a process
        // opening a channel by name must already know its own expected
        // capacity out of band, same as the mmf's fixed size on creation.
        // We read the capacity by mapping a header-sized view first.
        let probe = Region::open(&mmf_name, HEADER_SIZE)?;
        let capacity = read_header(&probe).capacity;
        drop(probe);
        let region = Region::open(&mmf_name, capacity as usize)?;

        let ws = CountingLock::open(&primitive_name(scope, name, "_ws"))?;
        let rs = CountingLock::open(&primitive_name(scope, name, "_rs"))?;
        let eas = CountingLock::open(&primitive_name(scope, name, "_eas"))?;
        let hme = ManualResetEvent::open(&primitive_name(scope, name, "_hme"))?;
        let nme = ManualResetEvent::open(&primitive_name(scope, name, "_nme"))?;
        let cce = ManualResetEvent::open(&primitive_name(scope, name, "_cce"))?;

        let channel = Self {
            name: name.to_string(),
            scope,
            capacity,
            direction,
            ws,
            rs,
            hme,
            nme,
            cce,
            eas,
            header_guard: Mutex::new(()),
            region,
        };

        if !channel.registration_lock().try_acquire() {
            return Err(Error::ObjectAlreadyInUse);
        }
        channel.cce.set();

        tracing::info!(name, direction = ?direction, "opened channel");
        Ok(channel)
    }

    /// Creates the region and all six named primitives, registering this
    /// session as the channel's sole writer.
    pub fn create_outbound(name: &str, config: ChannelConfig) -> Result<Self> {
        Self::create(name, config, Direction::Outbound)
    }

    /// Creates the region and all six named primitives, registering this
    /// session as the channel's sole reader.
    pub fn create_inbound(name: &str, config: ChannelConfig) -> Result<Self> {
        Self::create(name, config, Direction::Inbound)
    }

    /// Opens an existing channel as its writer and signals `_cce`.
    pub fn open_outbound(name: &str, scope: Scope) -> Result<Self> {
        Self::open(name, scope, Direction::Outbound)
    }

    /// Opens an existing channel as its reader and signals `_cce`.
    pub fn open_inbound(name: &str, scope: Scope) -> Result<Self> {
        Self::open(name, scope, Direction::Inbound)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    fn sync_message_signals(&self, state: &ChannelState) {
        if state.active_nodes > 0 {
            self.hme.set();
            self.nme.clear();
        } else {
            self.nme.set();
            self.hme.clear();
        }
    }

    fn with_exclusive_access<T>(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
        f: impl FnOnce(&mut Header) -> T,
    ) -> Result<(T, ChannelState)> {
        let _guard = self.header_guard.lock();
        wait_to_result(self.eas.acquire(timeout, cancel))?;
        let result = (|| {
            let mut header = read_header(&self.region);
            let value = f(&mut header);
            write_header(&self.region, header);
            (value, ChannelState::from(&header))
        })();
        self.eas.release();
        Ok(result)
    }

    /// Appends a message of `length` bytes (spec.md §4.3 `Write`).
    pub fn write(
        &self,
        length: i64,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
        callback: impl FnOnce(&mut [u8]) -> CallbackStatus,
    ) -> Result<Outcome> {
        let (status, state) =
            self.with_exclusive_access(timeout, cancel, |header| {
                queue::write(&self.region, header, length, callback)
            })?;
        self.sync_message_signals(&state);
        tracing::trace!(name = %self.name, ?status, active_nodes = state.active_nodes, "write");
        Ok(Outcome { state, status })
    }

    /// Consumes the oldest message (spec.md §4.3 `Read`).
    pub fn read(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
        callback: impl FnOnce(&[u8]) -> CallbackStatus,
    ) -> Result<Outcome> {
        let (status, state) =
            self.with_exclusive_access(timeout, cancel, |header| queue::read(&self.region, header, callback))?;
        self.sync_message_signals(&state);
        tracing::trace!(name = %self.name, ?status, active_nodes = state.active_nodes, "read");
        Ok(Outcome { state, status })
    }

    /// Reads `{capacity, active_nodes, total_space}` under the
    /// exclusive-access lock (spec.md §4.3 `State`).
    pub fn state(&self, timeout: Option<Duration>, cancel: Option<&CancelToken>) -> Result<Outcome> {
        let (_, state) = self.with_exclusive_access(timeout, cancel, |_| ())?;
        Ok(Outcome {
            state,
            status: OpStatus::Completed,
        })
    }

    /// Blocks until the peer opens the channel (`_cce`).
    pub fn wait_client_connected(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        wait_to_result(self.cce.wait(timeout, cancel))
    }

    /// Blocks until `active_nodes > 0` (`_hme`). A wake is a hint to retry
    /// `read`, not a guarantee a message survives until then (spec.md §4.4).
    pub fn wait_has_messages(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        wait_to_result(self.hme.wait(timeout, cancel))
    }

    /// Blocks until `active_nodes = 0` (`_nme`).
    pub fn wait_empty(&self, timeout: Option<Duration>, cancel: Option<&CancelToken>) -> Result<()> {
        wait_to_result(self.nme.wait(timeout, cancel))
    }

    /// A non-authoritative debug snapshot for operator troubleshooting;
    /// never consulted by the engine's own control flow.
    pub fn diagnostics(&self) -> Diagnostics {
        let header = read_header(&self.region);
        let mut free_list_len = 0usize;
        let mut cur = header.free_list_node;
        while cur >= 0 {
            free_list_len += 1;
            cur = crate::layout::read_node(&self.region, cur).next;
        }
        Diagnostics {
            header,
            free_list_len,
        }
    }
}

/// Debug snapshot returned by [`Channel::diagnostics`].
#[derive(Debug, Clone, Copy)]
pub struct Diagnostics {
    pub header: Header,
    pub free_list_len: usize,
}

impl Drop for Channel {
    fn drop(&mut self) {
        // Teardown order (spec.md §9 Design Notes): release the
        // registration lock, then drop the message-state signals, then the
        // exclusive-access lock, then the region view and handle — the last
        // three happen automatically via field declaration order once this
        // block returns.
        self.registration_lock().release();
        tracing::debug!(name = %self.name, direction = ?self.direction, "released registration lock");
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::debug::fmt_channel(self, f)
    }
}
