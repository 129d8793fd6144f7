//! TCP segment reassembly.
//!
//! Each TCP flow owns a [`TcpStream`]: pending segments keyed by sequence
//! number plus a contiguous emitted buffer. A segment whose sequence number
//! equals the next expected value is folded into the buffer immediately and
//! may unlock further pending segments; segments with future sequence numbers
//! wait; segments carrying only old data are dropped. The emitted buffer is
//! bounded, with the oldest prefix truncated on overflow so the newest data
//! is always retained.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Upper bound on the emitted buffer.
///
/// Truncation on overflow severs a match that straddles the truncation
/// boundary; acceptable at this bound in practice.
pub const MAX_REASSEMBLED: usize = 1024 * 1024;

/// Pending segments older than this are discarded by the sweep.
pub const SEGMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// `lhs < rhs` in sequence space, tolerant of wrap (RFC 1323 window test).
#[inline]
pub(crate) fn seq_lt(lhs: u32, rhs: u32) -> bool {
    lhs.wrapping_sub(rhs) > (1 << 31)
}

#[derive(Debug)]
struct Segment {
    data: Vec<u8>,
    arrived: Instant,
}

/// Reassembly state for one directional TCP flow.
#[derive(Debug, Default)]
pub struct TcpStream {
    /// Sequence number the next in-order byte must carry.
    next_expected: u32,
    initial_seq_set: bool,
    /// Out-of-order segments waiting for the gap to fill. All keys are
    /// at or after `next_expected`.
    pending: BTreeMap<u32, Segment>,
    /// Contiguous in-order bytes, bounded by [`MAX_REASSEMBLED`].
    emitted: Vec<u8>,
    /// Set when the emitted buffer grows; cleared by [`mark_consumed`].
    ///
    /// [`mark_consumed`]: TcpStream::mark_consumed
    has_new_data: bool,
    /// Prefix of `emitted` the detector has already scanned. Matches that
    /// end inside this prefix have fired before and must not fire again.
    scanned: usize,
    /// Worker-side bookkeeping: a sweep deadline is currently armed.
    sweep_armed: bool,
}

impl TcpStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchors the stream at the first observed sequence number. Later calls
    /// are ignored.
    pub fn set_initial_seq(&mut self, seq: u32) {
        if !self.initial_seq_set {
            self.next_expected = seq;
            self.initial_seq_set = true;
        }
    }

    #[inline]
    pub fn initialized(&self) -> bool {
        self.initial_seq_set
    }

    /// Accepts one segment. Empty segments (pure ACKs) are ignored; stale
    /// segments are dropped; in-order data is folded into the emitted buffer
    /// along with any pending segments it unlocks. Finally the emitted bound
    /// is enforced and pending segments older than [`SEGMENT_TIMEOUT`] are
    /// swept.
    pub fn add_segment(&mut self, seq: u32, data: &[u8], now: Instant) {
        if data.is_empty() {
            return;
        }
        if self.initial_seq_set && seq_lt(seq, self.next_expected) {
            log::debug!(
                "dropping old segment, seq {} expected {}",
                seq,
                self.next_expected
            );
        } else {
            self.pending.insert(
                seq,
                Segment {
                    data: data.to_vec(),
                    arrived: now,
                },
            );
            self.reassemble();
        }
        self.sweep_pending(now);
    }

    fn reassemble(&mut self) {
        if !self.initial_seq_set {
            return;
        }
        while let Some(segment) = self.pending.remove(&self.next_expected) {
            self.emitted.extend_from_slice(&segment.data);
            self.next_expected = self.next_expected.wrapping_add(segment.data.len() as u32);
            self.has_new_data = true;
        }
        if self.emitted.len() > MAX_REASSEMBLED {
            let excess = self.emitted.len() - MAX_REASSEMBLED;
            self.emitted.drain(..excess);
            self.scanned = self.scanned.saturating_sub(excess);
        }
    }

    /// Discards pending segments that have waited longer than
    /// [`SEGMENT_TIMEOUT`].
    pub fn sweep_pending(&mut self, now: Instant) {
        self.pending
            .retain(|_, segment| now.duration_since(segment.arrived) < SEGMENT_TIMEOUT);
    }

    /// Read-only view of the contiguous reassembled bytes. Bytes stay in the
    /// buffer after a scan so a match straddling scan boundaries still fires
    /// once the rest of it arrives.
    #[inline]
    pub fn emitted(&self) -> &[u8] {
        &self.emitted
    }

    #[inline]
    pub fn has_new_data(&self) -> bool {
        self.has_new_data
    }

    /// Length of the already-scanned prefix of [`emitted`](TcpStream::emitted).
    #[inline]
    pub fn scanned_len(&self) -> usize {
        self.scanned
    }

    /// Records that the detector consumed the current buffer.
    pub fn mark_consumed(&mut self) {
        self.has_new_data = false;
        self.scanned = self.emitted.len();
    }

    #[inline]
    pub fn pending_segments(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub(crate) fn sweep_armed(&self) -> bool {
        self.sweep_armed
    }

    #[inline]
    pub(crate) fn set_sweep_armed(&mut self, armed: bool) {
        self.sweep_armed = armed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_at(seq: u32) -> TcpStream {
        let mut stream = TcpStream::new();
        stream.set_initial_seq(seq);
        stream
    }

    #[test]
    fn core_reassembly_in_order() {
        let now = Instant::now();
        let mut stream = stream_at(1000);
        stream.add_segment(1000, b"SELECT ", now);
        stream.add_segment(1007, b"* FROM users", now);
        assert_eq!(stream.emitted(), b"SELECT * FROM users");
        assert!(stream.has_new_data());
        assert_eq!(stream.pending_segments(), 0);
    }

    #[test]
    fn core_reassembly_out_of_order_then_gap_fill() {
        let now = Instant::now();
        let mut stream = stream_at(1000);
        stream.add_segment(1007, b"* FROM users", now);
        assert_eq!(stream.emitted(), b"");
        assert_eq!(stream.pending_segments(), 1);
        stream.add_segment(1000, b"SELECT ", now);
        assert_eq!(stream.emitted(), b"SELECT * FROM users");
        assert_eq!(stream.pending_segments(), 0);
    }

    #[test]
    fn core_reassembly_any_permutation_converges() {
        let now = Instant::now();
        let segments: [(u32, &[u8]); 4] = [(0, b"ab"), (2, b"cde"), (5, b"f"), (6, b"ghij")];
        // Deliver in a few representative orders.
        for order in [[0usize, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]] {
            let mut stream = stream_at(0);
            for &i in &order {
                let (seq, data) = segments[i];
                stream.add_segment(seq, data, now);
            }
            assert_eq!(stream.emitted(), b"abcdefghij");
            assert_eq!(stream.pending_segments(), 0);
        }
    }

    #[test]
    fn core_reassembly_hole_blocks_emission() {
        let now = Instant::now();
        let mut stream = stream_at(100);
        stream.add_segment(100, b"head", now);
        stream.add_segment(110, b"tail", now);
        // Bytes 104..110 are missing.
        assert_eq!(stream.emitted(), b"head");
        assert_eq!(stream.pending_segments(), 1);
        stream.add_segment(104, b"middle", now);
        assert_eq!(stream.emitted(), b"headmiddletail");
    }

    #[test]
    fn core_reassembly_drops_stale_segment() {
        let now = Instant::now();
        let mut stream = stream_at(1000);
        stream.add_segment(1000, b"abcd", now);
        stream.add_segment(900, b"old", now);
        assert_eq!(stream.pending_segments(), 0);
        assert_eq!(stream.emitted(), b"abcd");
    }

    #[test]
    fn core_reassembly_empty_segment_ignored() {
        let now = Instant::now();
        let mut stream = stream_at(1000);
        stream.add_segment(1000, b"", now);
        assert!(!stream.has_new_data());
        assert_eq!(stream.pending_segments(), 0);
    }

    #[test]
    fn core_reassembly_bounded_buffer_keeps_newest() {
        let now = Instant::now();
        let mut stream = stream_at(0);
        let chunk = vec![0xaa; 512 * 1024];
        let mut seq = 0u32;
        for _ in 0..3 {
            stream.add_segment(seq, &chunk, now);
            assert!(stream.emitted().len() <= MAX_REASSEMBLED);
            seq = seq.wrapping_add(chunk.len() as u32);
        }
        assert_eq!(stream.emitted().len(), MAX_REASSEMBLED);
        // Newest marker data survives truncation.
        stream.add_segment(seq, b"newest", now);
        let emitted = stream.emitted();
        assert_eq!(emitted.len(), MAX_REASSEMBLED);
        assert_eq!(&emitted[emitted.len() - 6..], b"newest");
    }

    #[test]
    fn core_reassembly_truncation_adjusts_scanned_prefix() {
        let now = Instant::now();
        let mut stream = stream_at(0);
        let chunk = vec![0xbb; MAX_REASSEMBLED];
        stream.add_segment(0, &chunk, now);
        stream.mark_consumed();
        assert_eq!(stream.scanned_len(), MAX_REASSEMBLED);
        stream.add_segment(MAX_REASSEMBLED as u32, b"xy", now);
        // Two bytes were truncated from the front, so the scanned prefix
        // shrinks by the same amount.
        assert_eq!(stream.scanned_len(), MAX_REASSEMBLED - 2);
        assert!(stream.has_new_data());
    }

    #[test]
    fn core_reassembly_sweeps_expired_pending() {
        let now = Instant::now();
        let mut stream = stream_at(0);
        stream.add_segment(100, b"future", now);
        assert_eq!(stream.pending_segments(), 1);
        stream.sweep_pending(now + SEGMENT_TIMEOUT + Duration::from_secs(1));
        assert_eq!(stream.pending_segments(), 0);
    }

    #[test]
    fn core_reassembly_sequence_wraparound() {
        let now = Instant::now();
        let start = u32::MAX - 1;
        let mut stream = stream_at(start);
        stream.add_segment(start, b"ab", now);
        stream.add_segment(0, b"cd", now);
        assert_eq!(stream.emitted(), b"abcd");
    }
}
