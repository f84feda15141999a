//! Queue operations (spec.md §4.3): `write`, `read`, `state`. Each function
//! here assumes the exclusive-access lock is already held by the caller
//! (that serialization lives in [`crate::channel`]) and operates purely on
//! the header and region bytes, so it can be exercised directly against an
//! in-memory region stub, per spec.md §8.

use crate::alloc::{allocate, free};
use crate::error::Error;
use crate::layout::{payload_ptr, read_node, write_node, Header, Node, RegionBytes, NODE_SIZE, NONE};

/// The `{capacity, active_nodes, total_space}` projection of the header
/// (spec.md §4.3 `State()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    pub capacity: i64,
    pub active_nodes: i64,
    pub total_space: i64,
}

impl ChannelState {
    pub fn is_empty(&self) -> bool {
        self.active_nodes == 0
    }

    pub fn len(&self) -> i64 {
        self.active_nodes
    }
}

impl From<&Header> for ChannelState {
    fn from(h: &Header) -> Self {
        ChannelState {
            capacity: h.capacity,
            active_nodes: h.active_nodes,
            total_space: h.total_space,
        }
    }
}

/// What the user-supplied callback reported (spec.md §4.3, §9).
///
/// `Cancelled` and `DelegateFailed` are rollback signals; every other value
/// — including application-defined ones — commits.
#[derive(Debug, Clone)]
pub enum CallbackStatus {
    Completed,
    Cancelled,
    DelegateFailed(String),
    /// An application-defined status that is neither length-error code
    /// (spec.md §4.3): still commits, same as `Completed`.
    Custom(String),
}

impl CallbackStatus {
    fn is_rollback(&self) -> bool {
        matches!(self, CallbackStatus::Cancelled | CallbackStatus::DelegateFailed(_))
    }
}

/// The outcome of a single queue operation that reached the critical
/// section (i.e. the exclusive-access lock was acquired). Lock-acquisition
/// failures (`Timeout`/`Cancelled` on the lock itself) are reported as
/// `Err` by [`crate::channel`] instead, since no header state was observed.
#[derive(Debug, Clone)]
pub enum OpStatus {
    Completed,
    Cancelled,
    DelegateFailed(String),
    Custom(String),
    QueueIsEmpty,
    OutOfSpace,
    LengthGreaterThanLogicalAddressSpace,
    /// Part of the closed taxonomy (spec.md §4.3/§7) alongside
    /// `LengthGreaterThanLogicalAddressSpace`; never constructed here since
    /// `window_fits` collapses both checks on a 64-bit host (spec.md §4.3).
    LengthGreaterThanVirtualAddressSpace,
}

impl From<CallbackStatus> for OpStatus {
    fn from(s: CallbackStatus) -> Self {
        match s {
            CallbackStatus::Completed => OpStatus::Completed,
            CallbackStatus::Cancelled => OpStatus::Cancelled,
            CallbackStatus::DelegateFailed(m) => OpStatus::DelegateFailed(m),
            CallbackStatus::Custom(m) => OpStatus::Custom(m),
        }
    }
}

fn window_fits(region: &impl RegionBytes, offset: i64, length: i64) -> bool {
    if length < 0 {
        return false;
    }
    match offset
        .checked_add(NODE_SIZE as i64)
        .and_then(|v| v.checked_add(length))
    {
        Some(end) => end as u64 <= region.len() as u64,
        None => false,
    }
}

/// Undoes a not-yet-committed allocation. A free-list-sourced allocation is
/// spliced back into the free list; a high-water-sourced one is simply
/// discarded, since `total_space` was never bumped for it.
fn rollback_allocation(
    region: &impl RegionBytes,
    header: &mut Header,
    allocation: crate::alloc::Allocation,
    length: i64,
) {
    if allocation.from_free_list {
        free(region, header, allocation.offset, length);
    }
}

/// Appends a message of `length` bytes, invoking `callback` on the acquired
/// byte window before committing.
pub fn write(
    region: &impl RegionBytes,
    header: &mut Header,
    length: i64,
    callback: impl FnOnce(&mut [u8]) -> CallbackStatus,
) -> OpStatus {
    let allocation = match allocate(region, header, length) {
        Ok(a) => a,
        Err(Error::OutOfSpace) => return OpStatus::OutOfSpace,
        Err(_) => unreachable!("allocate only ever reports OutOfSpace"),
    };
    let offset = allocation.offset;

    if !window_fits(region, offset, length) {
        rollback_allocation(region, header, allocation, length);
        return OpStatus::LengthGreaterThanLogicalAddressSpace;
    }

    let window =
        unsafe { std::slice::from_raw_parts_mut(payload_ptr(region, offset), length as usize) };
    let status = callback(window);

    if status.is_rollback() {
        rollback_allocation(region, header, allocation, length);
        return status.into();
    }

    write_node(
        region,
        offset,
        Node {
            next: NONE,
            length,
        },
    );
    if header.tail_node >= 0 {
        let mut tail = read_node(region, header.tail_node);
        tail.next = offset;
        write_node(region, header.tail_node, tail);
    }
    header.tail_node = offset;
    if header.head_node < 0 {
        header.head_node = offset;
    }
    header.active_nodes += 1;

    let grown = (offset + NODE_SIZE as i64 + length) - header.total_space;
    if grown > 0 {
        header.total_space += grown;
    }

    status.into()
}

/// Consumes the oldest message, invoking `callback` on its byte window
/// before removing it from the active list.
pub fn read(
    region: &impl RegionBytes,
    header: &mut Header,
    callback: impl FnOnce(&[u8]) -> CallbackStatus,
) -> OpStatus {
    if header.head_node < 0 {
        return OpStatus::QueueIsEmpty;
    }

    let node_offset = header.head_node;
    let node = read_node(region, node_offset);

    if !window_fits(region, node_offset, node.length) {
        return OpStatus::LengthGreaterThanLogicalAddressSpace;
    }

    let window = unsafe {
        std::slice::from_raw_parts(payload_ptr(region, node_offset), node.length as usize)
    };
    let status = callback(window);

    if status.is_rollback() {
        // Message stays at the head; header untouched.
        return status.into();
    }

    header.head_node = node.next;
    header.active_nodes -= 1;
    if header.head_node < 0 {
        // Deliberate strengthening of invariant #1 (spec.md §9): the
        // original source leaves `tail_node` dangling here.
        header.tail_node = NONE;
    }
    free(region, header, node_offset, node.length);

    status.into()
}

/// Projects the header into a `ChannelState` snapshot.
pub fn state(header: &Header) -> ChannelState {
    header.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{write_header, HEADER_SIZE};

    struct VecRegion(std::cell::UnsafeCell<Vec<u8>>);

    impl VecRegion {
        fn new(size: usize) -> Self {
            Self(std::cell::UnsafeCell::new(vec![0u8; size]))
        }
    }

    impl RegionBytes for VecRegion {
        fn as_mut_ptr(&self) -> *mut u8 {
            unsafe { (*self.0.get()).as_mut_ptr() }
        }
        fn len(&self) -> usize {
            unsafe { (*self.0.get()).len() }
        }
    }

    fn fresh(capacity: usize) -> (VecRegion, Header) {
        let region = VecRegion::new(capacity);
        let header = Header::formatted(capacity as i64);
        write_header(&region, header);
        (region, header)
    }

    fn write_bytes(region: &VecRegion, header: &mut Header, payload: &[u8]) -> OpStatus {
        write(region, header, payload.len() as i64, |w| {
            w.copy_from_slice(payload);
            CallbackStatus::Completed
        })
    }

    #[test]
    fn empty_read_reports_queue_is_empty() {
        let (region, mut header) = fresh(4096);
        let status = read(&region, &mut header, |_| CallbackStatus::Completed);
        assert!(matches!(status, OpStatus::QueueIsEmpty));
        assert_eq!(header.active_nodes, 0);
        assert_eq!(header.head_node, NONE);
        assert_eq!(header.tail_node, NONE);
    }

    #[test]
    fn write_then_read_round_trips_payload() {
        let (region, mut header) = fresh(4096);
        write_bytes(&region, &mut header, b"hello");

        let mut seen = Vec::new();
        let status = read(&region, &mut header, |w| {
            seen.extend_from_slice(w);
            CallbackStatus::Completed
        });
        assert!(matches!(status, OpStatus::Completed));
        assert_eq!(seen, b"hello");
        assert_eq!(header.active_nodes, 0);
        assert_eq!(header.head_node, NONE);
        assert_eq!(header.tail_node, NONE);
    }

    #[test]
    fn fifo_order_over_several_messages() {
        let (region, mut header) = fresh(4096);
        let payloads: [&[u8]; 3] = [b"a", b"bb", b"ccc"];
        for p in payloads {
            write_bytes(&region, &mut header, p);
        }
        for expected in payloads {
            let mut seen = Vec::new();
            read(&region, &mut header, |w| {
                seen.extend_from_slice(w);
                CallbackStatus::Completed
            });
            assert_eq!(seen, expected);
        }
        assert_eq!(header.active_nodes, 0);
    }

    #[test]
    fn zero_length_write_is_readable_as_empty_payload() {
        let (region, mut header) = fresh(4096);
        let status = write_bytes(&region, &mut header, b"");
        assert!(matches!(status, OpStatus::Completed));
        let mut seen = Vec::new();
        read(&region, &mut header, |w| {
            seen.extend_from_slice(w);
            CallbackStatus::Completed
        });
        assert!(seen.is_empty());
    }

    #[test]
    fn cancelled_write_rolls_back_and_leaves_active_nodes_unchanged() {
        let (region, mut header) = fresh(4096);
        write_bytes(&region, &mut header, b"keep");
        let active_before = header.active_nodes;
        let total_space_before = header.total_space;

        let status = write(&region, &mut header, 4, |_| CallbackStatus::Cancelled);
        assert!(matches!(status, OpStatus::Cancelled));
        assert_eq!(header.active_nodes, active_before);
        // High-water allocation: no growth should have been committed.
        assert_eq!(header.total_space, total_space_before);
    }

    #[test]
    fn cancelled_write_from_free_list_returns_extent_to_free_list() {
        let (region, mut header) = fresh(4096);
        write_bytes(&region, &mut header, b"aaaaa");
        write_bytes(&region, &mut header, b"bbbbb");
        let mut first = Vec::new();
        read(&region, &mut header, |w| {
            first.extend_from_slice(w);
            CallbackStatus::Completed
        });
        assert_eq!(first, b"aaaaa");
        assert_ne!(header.free_list_node, NONE);

        let status = write(&region, &mut header, 5, |_| CallbackStatus::DelegateFailed("boom".into()));
        assert!(matches!(status, OpStatus::DelegateFailed(_)));
        assert_ne!(header.free_list_node, NONE);
        assert_eq!(header.active_nodes, 1);
    }

    #[test]
    fn rejected_read_leaves_message_at_head() {
        let (region, mut header) = fresh(4096);
        write_bytes(&region, &mut header, b"stay");
        let head_before = header.head_node;

        let status = read(&region, &mut header, |_| CallbackStatus::Cancelled);
        assert!(matches!(status, OpStatus::Cancelled));
        assert_eq!(header.head_node, head_before);
        assert_eq!(header.active_nodes, 1);
    }

    #[test]
    fn out_of_space_leaves_header_untouched() {
        let (region, mut header) = fresh(64);
        let before = header;
        let status = write(&region, &mut header, 100, |_| CallbackStatus::Completed);
        assert!(matches!(status, OpStatus::OutOfSpace));
        assert_eq!(header, before);
    }

    #[test]
    fn exact_match_reuse_scenario() {
        let (region, mut header) = fresh(4096);
        write_bytes(&region, &mut header, &[0u8; 5]);
        write_bytes(&region, &mut header, &[0u8; 5]);
        let total_space_t = header.total_space;

        read(&region, &mut header, |_| CallbackStatus::Completed);
        write_bytes(&region, &mut header, &[0u8; 5]);

        assert_eq!(header.total_space, total_space_t);
        assert_eq!(header.active_nodes, 2);
    }

    #[test]
    fn split_reuse_scenario() {
        let (region, mut header) = fresh(4096);
        write_bytes(&region, &mut header, &[0u8; 16]);
        write_bytes(&region, &mut header, &[0u8; 16]);
        let total_space_t = header.total_space;

        read(&region, &mut header, |_| CallbackStatus::Completed);
        write_bytes(&region, &mut header, &[]);

        assert_eq!(header.total_space, total_space_t);
        assert_eq!(header.active_nodes, 2);
        assert_ne!(header.free_list_node, NONE);
        let remainder = read_node(&region, header.free_list_node);
        assert_eq!(remainder.length, 0);
    }

    #[test]
    fn grow_past_high_water_scenario() {
        let (region, mut header) = fresh(4096);
        write_bytes(&region, &mut header, &[0u8; 5]);
        write_bytes(&region, &mut header, &[0u8; 5]);
        read(&region, &mut header, |_| CallbackStatus::Completed);
        let total_space_before = header.total_space;

        write_bytes(&region, &mut header, &[0u8; 6]);

        assert_eq!(header.total_space, total_space_before + 1);
        assert_eq!(header.active_nodes, 2);
    }

    #[test]
    fn random_length_messages_round_trip_in_order() {
        let (region, mut header) = fresh(1 << 20);
        let mut expected = Vec::new();
        for _ in 0..64 {
            let len = fastrand::usize(0..512);
            let payload: Vec<u8> = (0..len).map(|_| fastrand::u8(..)).collect();
            write_bytes(&region, &mut header, &payload);
            expected.push(payload);
        }
        for payload in expected {
            let mut seen = Vec::new();
            read(&region, &mut header, |w| {
                seen.extend_from_slice(w);
                CallbackStatus::Completed
            });
            assert_eq!(seen, payload);
        }
        assert_eq!(header.active_nodes, 0);
        assert_eq!(header.head_node, NONE);
        assert_eq!(header.tail_node, NONE);
    }

    #[test]
    fn draining_every_message_leaves_single_free_span() {
        let (region, mut header) = fresh(4096);
        for _ in 0..5 {
            let len = fastrand::usize(0..64);
            let payload: Vec<u8> = vec![7u8; len];
            write_bytes(&region, &mut header, &payload);
        }
        for _ in 0..5 {
            read(&region, &mut header, |_| CallbackStatus::Completed);
        }
        assert_eq!(header.active_nodes, 0);
        // One coalesced free span covering [HEADER_SIZE, total_space).
        assert_ne!(header.free_list_node, NONE);
        let span = read_node(&region, header.free_list_node);
        assert_eq!(span.next, NONE);
        assert_eq!(
            header.free_list_node + NODE_SIZE as i64 + span.length,
            header.total_space
        );
        assert_eq!(header.free_list_node, HEADER_SIZE as i64);
    }
}
