//! Flow state management.
//!
//! Flows are keyed by the directional five-tuple and tracked in a
//! bounded-capacity table with least-recently-touched eviction. TCP flows own
//! their reassembly stream, so evicting a flow also releases its buffered
//! segments.

pub mod reassembly;

use self::reassembly::TcpStream;

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Instant;

use hashlink::linked_hash_map::{LinkedHashMap, RawEntryMut};
use serde::Serialize;

/// Directional five-tuple identifying a flow.
///
/// `(A -> B)` and `(B -> A)` are distinct flows; pairing the two directions
/// of a conversation, if ever needed, is a detector-level concern. Ports are
/// zero for protocols other than TCP and UDP.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub proto: u8,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} protocol {}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.proto
        )
    }
}

/// Per-flow state.
#[derive(Debug, Default)]
pub struct Flow {
    /// Steady-clock timestamp of the most recent frame.
    pub last_seen: Option<Instant>,
    /// Cumulative frame count.
    pub packets: u64,
    /// Cumulative byte count, maintained by the caller.
    pub bytes: u64,
    /// Reassembly state; populated on the first TCP segment.
    pub tcp: Option<TcpStream>,
}

/// Bounded flow table with LRU eviction.
///
/// Owned by the worker; no synchronization. Recency order lives in the
/// underlying [`LinkedHashMap`]: the front entry is the eviction candidate
/// and every touch splices the entry to the back.
pub struct FlowTable {
    table: LinkedHashMap<FlowKey, Flow>,
    capacity: usize,
    evictions: u64,
}

impl FlowTable {
    /// Creates a table that holds at most `capacity` flows.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "flow table capacity must be non-zero");
        FlowTable {
            table: LinkedHashMap::with_capacity(capacity),
            capacity,
            evictions: 0,
        }
    }

    /// Returns the flow for `key`, creating it if absent, and records the
    /// sighting: the entry moves to most-recently-used, `last_seen` is
    /// updated, and the packet count is incremented. Byte accounting is left
    /// to the caller. If the table is full the least-recently-touched flow is
    /// evicted first.
    pub fn touch(&mut self, key: FlowKey, now: Instant) -> &mut Flow {
        match self.table.raw_entry_mut().from_key(&key) {
            RawEntryMut::Occupied(mut occupied) => {
                occupied.to_back();
            }
            RawEntryMut::Vacant(_) => {
                if self.table.len() >= self.capacity {
                    if let Some((evicted, _)) = self.table.pop_front() {
                        self.evictions += 1;
                        log::debug!("flow table full, evicting {}", evicted);
                    }
                }
                // New entries land at the most-recently-used end.
                self.table.insert(key, Flow::default());
            }
        }
        let flow = self
            .table
            .get_mut(&key)
            .expect("flow entry present after touch");
        flow.last_seen = Some(now);
        flow.packets += 1;
        flow
    }

    /// Looks up a flow without refreshing its recency.
    pub fn get_mut(&mut self, key: &FlowKey) -> Option<&mut Flow> {
        self.table.get_mut(key)
    }

    #[inline]
    pub fn contains(&self, key: &FlowKey) -> bool {
        self.table.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of flows evicted by capacity pressure so far.
    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Keys in recency order, least recently touched first.
    pub fn keys_lru_first(&self) -> impl Iterator<Item = &FlowKey> {
        self.table.iter().map(|(k, _)| k)
    }
}
