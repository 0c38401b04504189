//! The jitter buffer core: a fixed-capacity ring of packets, read/write
//! cursors, and the running duration/readiness/jitter statistics that
//! together absorb short-term variance in packet inter-arrival time.
//!
//! The design traces directly back to a playout buffer that fills while a
//! speaker is silent and drains once it has enough buffered audio to ride
//! out jitter, generalized here to an explicit delay budget in milliseconds,
//! a fixed-size slot array instead of a growable queue, and an RFC 3550
//! jitter estimate kept alongside the buffering logic.

mod overflow;

use derivative::Derivative;

use crate::clock::{MediaClock, MediaFormat};
use crate::error::JitterBufferError;
use crate::jitter::JitterEstimator;
use crate::packet::Packet;

/// Default ring capacity, matching the delay budgets this buffer is tuned
/// for (tens of milliseconds of 10-20ms packets comfortably fit in 100 slots
/// with headroom for gaps).
pub const QUEUE_SIZE: usize = 100;

/// A fixed-capacity jitter buffer for a single media stream.
///
/// Not `Sync`: callers serialize [`write`](Self::write) and [`read`](Self::read)
/// themselves (typically one task owns one buffer per stream), matching the
/// single-threaded-per-instance model this design is built around.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct JitterBuffer {
    #[derivative(Debug = "ignore")]
    slots: Vec<Option<Packet>>,
    capacity: usize,

    read_cursor: usize,
    write_cursor: usize,

    duration_total_ms: i64,
    jitter_budget_ms: u32,

    ready: bool,
    read_started: bool,
    write_started: bool,

    drift_ms: i64,
    timestamp_ms: i64,

    jitter: JitterEstimator,

    #[derivative(Debug = "ignore")]
    clock: Option<Box<dyn MediaClock>>,
    format: Option<MediaFormat>,

    corrected_duration_accounting: bool,
}

impl JitterBuffer {
    /// Builds a buffer with the default capacity ([`QUEUE_SIZE`]) and no
    /// clock configured. Call [`set_clock`](Self::set_clock) before the
    /// first [`write`](Self::write).
    pub fn new(jitter_budget_ms: u32) -> Self {
        Self::builder(jitter_budget_ms)
            .build()
            .expect("default capacity is non-zero")
    }

    /// Starts building a buffer with non-default configuration (capacity,
    /// clock, format, or the out-of-order accounting mode).
    pub fn builder(jitter_budget_ms: u32) -> JitterBufferBuilder {
        JitterBufferBuilder::new(jitter_budget_ms)
    }

    fn new_with(
        jitter_budget_ms: u32,
        capacity: usize,
        clock: Option<Box<dyn MediaClock>>,
        format: Option<MediaFormat>,
        corrected_duration_accounting: bool,
    ) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            capacity,
            read_cursor: 0,
            write_cursor: 0,
            duration_total_ms: 0,
            jitter_budget_ms,
            ready: false,
            read_started: true,
            write_started: false,
            drift_ms: 0,
            timestamp_ms: 0,
            jitter: JitterEstimator::new(),
            clock,
            format,
            corrected_duration_accounting,
        }
    }

    /// Installs the clock collaborator. If a non-[`MediaFormat::Any`] format
    /// was previously set via [`set_format`](Self::set_format), it is
    /// immediately propagated to the new clock.
    pub fn set_clock(&mut self, mut clock: impl MediaClock + 'static) {
        if let Some(format) = self.format {
            if !matches!(format, MediaFormat::Any) {
                clock.set_format(format);
            }
        }
        self.clock = Some(Box::new(clock));
    }

    /// Sets the media format, propagating it to the clock if one is already
    /// installed. [`MediaFormat::Any`] is recorded but never forwarded.
    pub fn set_format(&mut self, format: MediaFormat) {
        self.format = Some(format);
        if !matches!(format, MediaFormat::Any) {
            if let Some(clock) = self.clock.as_mut() {
                clock.set_format(format);
            }
        }
    }

    fn inc(&self, index: usize, delta: usize) -> usize {
        (index + delta) % self.capacity
    }

    fn dec(&self, index: usize, delta: usize) -> usize {
        let delta = delta % self.capacity;
        (index + self.capacity - delta) % self.capacity
    }

    /// Consumes one packet: derives its presentation time, folds it into the
    /// jitter estimate, and inserts it into the ring (discarding it if it is
    /// a late arrival on an already-draining buffer).
    ///
    /// Returns [`JitterBufferError::ClockNotConfigured`] if no clock has
    /// been installed; no other failure mode is surfaced as an `Err` (see
    /// the crate's error-handling documentation).
    pub fn write(&mut self, mut packet: Packet) -> Result<(), JitterBufferError> {
        let clock = self
            .clock
            .as_mut()
            .ok_or(JitterBufferError::ClockNotConfigured)?;

        let t = clock.time_of(packet.stream_timestamp.0);
        packet.presentation_time_ms = t;
        let now = clock.now();

        self.jitter.observe(now, t);

        if self.ready && self.read_started && t <= self.timestamp_ms {
            tracing::warn!(
                sequence = packet.sequence_number.0,
                presentation_time_ms = t,
                timestamp_ms = self.timestamp_ms,
                "discarding late packet"
            );
            return Ok(());
        }

        if !self.write_started {
            self.slots[0] = Some(packet);
            self.write_cursor = 0;
            self.write_started = true;
        } else {
            self.insert_subsequent(packet, t);
        }

        if !self.ready && self.duration_total_ms > self.jitter_budget_ms as i64 {
            self.ready = true;
        }

        Ok(())
    }

    fn insert_subsequent(&mut self, packet: Packet, t: i64) {
        let prev_seq = self.slots[self.write_cursor]
            .as_ref()
            .expect("write_cursor always names a stored packet while write_started")
            .sequence_number;
        let diff: i16 = packet.sequence_number - prev_seq;

        match diff.cmp(&0) {
            std::cmp::Ordering::Greater if diff == 1 => self.insert_in_order(packet, t),
            std::cmp::Ordering::Greater => self.insert_with_gap(packet, t, diff as usize),
            std::cmp::Ordering::Less => self.insert_out_of_order(packet, t, diff),
            std::cmp::Ordering::Equal => {
                tracing::trace!(
                    sequence = packet.sequence_number.0,
                    "duplicate sequence number, overwriting in place"
                );
                self.slots[self.write_cursor] = Some(packet);
            },
        }
    }

    fn settle_previous_duration(&mut self, old_write_cursor: usize, t: i64) {
        if let Some(prev) = self.slots[old_write_cursor].as_mut() {
            prev.duration_ms = t - prev.presentation_time_ms;
            self.duration_total_ms += prev.duration_ms;
        }
    }

    fn insert_in_order(&mut self, packet: Packet, t: i64) {
        let old_write_cursor = self.write_cursor;
        let new_write_cursor = self.inc(self.write_cursor, 1);

        if new_write_cursor == self.read_cursor && self.slots[new_write_cursor].is_some() {
            if let Some(evicted) = self.slots[new_write_cursor].take() {
                self.duration_total_ms -= evicted.duration_ms;
            }
            self.read_cursor = self.inc(self.read_cursor, 1);
        }

        self.settle_previous_duration(old_write_cursor, t);

        self.write_cursor = new_write_cursor;
        self.slots[self.write_cursor] = Some(packet);
    }

    fn insert_with_gap(&mut self, packet: Packet, t: i64, diff: usize) {
        let old_write_cursor = self.write_cursor;
        let raw_sum = self.write_cursor + diff;
        let next_write_cursor = raw_sum % self.capacity;
        let wrapped = raw_sum >= self.capacity;

        if overflow::requires_eviction(
            wrapped,
            self.write_cursor,
            next_write_cursor,
            self.read_cursor,
        ) {
            self.read_cursor = overflow::clean_on_positive_overflow(
                &mut self.slots,
                &mut self.duration_total_ms,
                self.read_cursor,
                next_write_cursor,
            );
        }

        self.settle_previous_duration(old_write_cursor, t);

        self.write_cursor = next_write_cursor;
        self.slots[self.write_cursor] = Some(packet);
    }

    fn insert_out_of_order(&mut self, mut packet: Packet, _t: i64, diff: i16) {
        let right_index = self.write_cursor;
        // `diff` is negative; negate via i32 so `i16::MIN` (a full-range
        // backward jump) doesn't overflow on negation.
        let backward = (-(diff as i32)) as usize;
        let slot = self.dec(self.write_cursor, backward);

        // Left neighbor: walk backward from slot - 1 for at most one lap.
        let mut left_found = None;
        let mut idx = self.dec(slot, 1);
        for _ in 0..self.capacity.saturating_sub(1) {
            if self.slots[idx].is_some() {
                left_found = Some(idx);
                break;
            }
            idx = self.dec(idx, 1);
        }

        let mut left_duration_delta = 0i64;
        if let Some(left_idx) = left_found {
            let neighbor = self.slots[left_idx]
                .as_mut()
                .expect("left_found only set for occupied slots");
            let old_duration = neighbor.duration_ms;
            neighbor.duration_ms = packet.presentation_time_ms - neighbor.presentation_time_ms;
            left_duration_delta = neighbor.duration_ms - old_duration;
        }

        // Right neighbor: walk forward from slot + 1 until a occupied slot
        // or right_index (which always holds the previous write cursor's
        // packet, so the walk is bounded).
        let mut idx = self.inc(slot, 1);
        loop {
            if let Some(neighbor) = self.slots[idx].as_ref() {
                packet.duration_ms = neighbor.presentation_time_ms - packet.presentation_time_ms;
                break;
            }
            if idx == right_index {
                break;
            }
            idx = self.inc(idx, 1);
        }

        if self.corrected_duration_accounting {
            self.duration_total_ms += packet.duration_ms + left_duration_delta;
        }

        self.slots[slot] = Some(packet);
    }

    /// Delivers the next packet in presentation-time order, or `None` if the
    /// buffer is still warming up or genuinely empty.
    ///
    /// `local_now_ms` is the consumer's own clock, used only to compute
    /// [`drift_ms`](Self) on the first call after construction or
    /// [`reset`](Self::reset).
    pub fn read(&mut self, local_now_ms: i64) -> Option<Packet> {
        if !self.ready {
            return None;
        }

        if !self.read_started {
            self.read_started = true;
            let slot0 = self.slots[0].as_ref().map_or(0, |p| p.presentation_time_ms);
            self.drift_ms = slot0 - local_now_ms;
        }

        self.timestamp_ms = local_now_ms + self.drift_ms;

        if self.duration_total_ms == 0 {
            return None;
        }

        let packet = self.slots[self.read_cursor].take()?;
        self.duration_total_ms -= packet.duration_ms;
        self.read_cursor = self.inc(self.read_cursor, 1);

        for _ in 0..self.capacity {
            if self.duration_total_ms < 0 || self.slots[self.read_cursor].is_some() {
                break;
            }
            self.read_cursor = self.inc(self.read_cursor, 1);
        }

        Some(packet)
    }

    /// Returns the buffer to its just-constructed state: cursors, duration
    /// total, drift, and the jitter estimator's previous-arrival stamps are
    /// cleared, `ready` drops, and the clock is reset. The jitter
    /// estimate/max themselves are *not* cleared — see the crate
    /// documentation for why. Slot contents are left in place; the next
    /// `write` overwrites slot 0 as if starting fresh.
    pub fn reset(&mut self) {
        self.duration_total_ms = 0;
        self.drift_ms = 0;
        self.read_cursor = 0;
        self.write_cursor = 0;
        self.ready = false;
        self.read_started = false;
        self.write_started = false;
        if let Some(clock) = self.clock.as_mut() {
            clock.reset();
        }
    }

    /// Clears the running jitter estimate and its previous-arrival stamps,
    /// independent of [`reset`](Self::reset).
    pub fn reset_jitter_stats(&mut self) {
        self.jitter.reset();
    }

    pub fn get_jitter_budget(&self) -> u32 {
        self.jitter_budget_ms
    }

    pub fn get_inter_arrival_jitter(&self) -> f64 {
        self.jitter.estimate()
    }

    pub fn get_max_jitter(&self) -> f64 {
        self.jitter.max()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of occupied slots. Not on the data path; useful for metrics.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Builds a [`JitterBuffer`] with non-default capacity, clock, format, or
/// out-of-order accounting mode.
pub struct JitterBufferBuilder {
    jitter_budget_ms: u32,
    capacity: usize,
    clock: Option<Box<dyn MediaClock>>,
    format: Option<MediaFormat>,
    corrected_duration_accounting: bool,
}

impl JitterBufferBuilder {
    fn new(jitter_budget_ms: u32) -> Self {
        Self {
            jitter_budget_ms,
            capacity: QUEUE_SIZE,
            clock: None,
            format: None,
            corrected_duration_accounting: false,
        }
    }

    /// Overrides the default ring capacity ([`QUEUE_SIZE`]).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn clock(mut self, clock: impl MediaClock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn format(mut self, format: MediaFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Enables the opt-in corrected out-of-order duration accounting. See
    /// the crate documentation's design notes for why this defaults to off.
    pub fn corrected_duration_accounting(mut self, enabled: bool) -> Self {
        self.corrected_duration_accounting = enabled;
        self
    }

    pub fn build(mut self) -> Result<JitterBuffer, JitterBufferError> {
        if self.capacity == 0 {
            return Err(JitterBufferError::ZeroCapacity);
        }
        if let (Some(clock), Some(format)) = (self.clock.as_mut(), self.format) {
            if !matches!(format, MediaFormat::Any) {
                clock.set_format(format);
            }
        }
        Ok(JitterBuffer::new_with(
            self.jitter_budget_ms,
            self.capacity,
            self.clock,
            self.format,
            self.corrected_duration_accounting,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::IdentityClock;
    use bytes::Bytes;

    fn packet(seq: u16, ts: u32) -> Packet {
        Packet::new(seq, ts, Bytes::new())
    }

    fn buffer(budget: u32) -> JitterBuffer {
        let mut b = JitterBuffer::new(budget);
        b.set_clock(IdentityClock::new());
        b
    }

    #[test]
    fn s1_steady_stream_ready_latches() {
        let mut b = buffer(30);
        b.write(packet(1, 0)).unwrap();
        b.write(packet(2, 10)).unwrap();
        b.write(packet(3, 20)).unwrap();
        b.write(packet(4, 30)).unwrap();
        assert!(!b.is_ready(), "duration_total == budget, not yet >");

        b.write(packet(5, 40)).unwrap();
        assert!(b.is_ready());

        let delivered = b.read(0).unwrap();
        assert_eq!(delivered.sequence_number.0, 1);
    }

    #[test]
    fn s2_out_of_order_within_window() {
        let mut b = buffer(25);
        b.write(packet(1, 0)).unwrap();
        b.write(packet(2, 10)).unwrap();
        b.write(packet(4, 30)).unwrap();
        b.write(packet(3, 20)).unwrap();
        assert!(b.is_ready(), "duration_total reaches 30 > 25 by packet 4");

        // The last-written packet (seq 4) never settles a duration of its
        // own until a successor arrives, so duration_total_ms hits zero
        // (and read returns None) once the first three have been drained.
        let seen: Vec<i64> = std::iter::from_fn(|| b.read(0))
            .map(|p| p.presentation_time_ms)
            .collect();
        assert_eq!(seen, vec![0, 10, 20]);
    }

    #[test]
    fn s3_late_discard() {
        let mut b = buffer(30);
        for (seq, ts) in [(1, 0), (2, 10), (3, 20), (4, 30), (5, 40)] {
            b.write(packet(seq, ts)).unwrap();
        }
        assert!(b.is_ready());
        b.read(50);
        let before = b.duration_total_ms;

        b.write(packet(6, 40)).unwrap();
        assert_eq!(b.duration_total_ms, before);
    }

    #[test]
    #[ntest::timeout(1000)]
    fn s4_positive_overflow_simple_eviction() {
        let mut b = JitterBuffer::builder(10)
            .clock(IdentityClock::new())
            .build()
            .unwrap();

        for seq in 1..=100u16 {
            b.write(packet(seq, (seq as u32 - 1) * 10)).unwrap();
        }
        assert_eq!(b.len(), 100);

        b.write(packet(101, 1000)).unwrap();

        assert_eq!(b.read_cursor, 1);
        assert!(b.slots[0].is_none() || b.slots[0].as_ref().unwrap().sequence_number.0 != 1);
    }

    #[test]
    fn wire_timestamp_decodes_via_byteorder() {
        use byteorder::{BigEndian, ByteOrder};

        let wire = [0x00, 0x00, 0x27, 0x10]; // 10000 in big-endian
        let ts = BigEndian::read_u32(&wire);

        let mut b = buffer(5);
        b.write(packet(1, ts)).unwrap();
        assert_eq!(b.slots[0].as_ref().unwrap().stream_timestamp.0, 10000);
    }

    #[test]
    fn s5_gap_with_no_arrival() {
        let mut b = buffer(20);
        b.write(packet(1, 0)).unwrap();
        b.write(packet(3, 20)).unwrap();

        assert!(b.slots[1].is_none());
        assert_eq!(b.slots[2].as_ref().unwrap().sequence_number.0, 3);
        assert_eq!(b.slots[0].as_ref().unwrap().duration_ms, 20);
    }

    #[test]
    fn s7_positive_overflow_with_gap() {
        let mut b = JitterBuffer::builder(5)
            .capacity(8)
            .clock(IdentityClock::new())
            .build()
            .unwrap();

        for seq in 1..=7u16 {
            b.write(packet(seq, (seq as u32 - 1) * 10)).unwrap();
        }
        // write_cursor is at 6 (slot index for seq 7), read_cursor at 0.
        // A gap-write (seq 10, diff=3) pushes the raw advance to 6+3=9,
        // which exceeds capacity 8 (wrapped), giving next_write_cursor=1.
        // Table row 2 applies (wrapped, r < w, nw >= r): eviction fires,
        // consuming slots 1 and 0 (seq 2 and seq 1) and leaving read_cursor
        // just past the evicted run.
        b.write(packet(10, 150)).unwrap();
        assert_eq!(b.write_cursor, 1);
        assert_eq!(b.read_cursor, 2);
        assert!(b.slots[0].is_none());
        assert_eq!(b.slots[1].as_ref().unwrap().sequence_number.0, 10);
    }

    #[test]
    fn s8_clock_not_configured_is_rejected_without_mutation() {
        let mut b = JitterBuffer::new(30);
        let err = b.write(packet(1, 0)).unwrap_err();
        assert_eq!(err, JitterBufferError::ClockNotConfigured);
        assert!(!b.write_started);
        assert_eq!(b.duration_total_ms, 0);
    }

    #[test]
    fn s9_sequence_wraparound_stays_in_order_branch() {
        let mut b = buffer(1000);
        for (seq, ts) in [(65534u16, 0u32), (65535, 10), (0, 20), (1, 30)] {
            b.write(packet(seq, ts)).unwrap();
        }
        // All in-order: write_cursor should have advanced 3 times from 0.
        assert_eq!(b.write_cursor, 3);
        assert_eq!(b.slots[1].as_ref().unwrap().sequence_number.0, 65535);
        assert_eq!(b.slots[2].as_ref().unwrap().sequence_number.0, 0);
        assert_eq!(b.slots[3].as_ref().unwrap().sequence_number.0, 1);
    }

    #[test]
    fn ready_is_monotonic_until_reset() {
        let mut b = buffer(10);
        for (seq, ts) in [(1, 0), (2, 10), (3, 20)] {
            b.write(packet(seq, ts)).unwrap();
        }
        assert!(b.is_ready());
        b.read(0);
        b.read(10);
        assert!(b.is_ready());

        b.reset();
        assert!(!b.is_ready());
    }

    #[test]
    fn zero_capacity_builder_is_rejected() {
        let err = JitterBuffer::builder(10).capacity(0).build().unwrap_err();
        assert_eq!(err, JitterBufferError::ZeroCapacity);
    }

    #[test]
    fn corrected_duration_accounting_keeps_sum_rule_exact() {
        let mut b = JitterBuffer::builder(5)
            .clock(IdentityClock::new())
            .corrected_duration_accounting(true)
            .build()
            .unwrap();

        b.write(packet(1, 0)).unwrap();
        b.write(packet(2, 10)).unwrap();
        b.write(packet(4, 30)).unwrap();
        b.write(packet(3, 20)).unwrap();

        let sum: i64 = b.slots.iter().flatten().map(|p| p.duration_ms).sum();
        assert_eq!(sum, b.duration_total_ms);
    }
}
