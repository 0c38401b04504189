//! Positive-overflow eviction: the four-case geometry from the buffer's
//! module documentation, factored out so each row of the table can be
//! driven directly in tests without a full `write` sequence.

use crate::packet::Packet;

/// Whether a gap-write (`diff > 1`) whose raw advance is `raw_sum = w + diff`
/// requires evicting a run of packets backward from `nw` before the new
/// packet can be stored.
///
/// `w`/`nw`/`r` are `write_cursor`/`next_write_cursor`/`read_cursor`; `wrapped`
/// is whether the raw (un-mod'd) advance crossed the capacity boundary.
pub(crate) fn requires_eviction(wrapped: bool, w: usize, nw: usize, r: usize) -> bool {
    if wrapped {
        (r > w && nw < r) || (r < w && nw >= r)
    } else {
        r > w && nw >= r
    }
}

/// Evicts the run of packets from `nw` backward to (but not including)
/// `old_read - 1`, stopping early at the first empty slot, and advances the
/// read cursor to just past the evicted run.
///
/// Returns the new `read_cursor`.
pub(crate) fn clean_on_positive_overflow(
    slots: &mut [Option<Packet>],
    duration_total_ms: &mut i64,
    old_read: usize,
    nw: usize,
) -> usize {
    let capacity = slots.len();
    let new_read = (nw + 1) % capacity;
    let span = (nw + capacity - old_read) % capacity + 1;

    let mut idx = nw;
    for _ in 0..span {
        match slots[idx].take() {
            Some(packet) => *duration_total_ms -= packet.duration_ms,
            None => break,
        }
        idx = (idx + capacity - 1) % capacity;
    }

    new_read
}
