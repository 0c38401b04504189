use std::ops::Sub;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A wire sequence number, treated as an unsigned 16-bit counter that wraps.
///
/// Subtracting two sequence numbers yields a signed difference in
/// `[-32768, 32767]` via wrapping 16-bit arithmetic, so ordering decisions
/// stay correct across the wraparound point.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u16);

impl Sub for SequenceNumber {
    type Output = i16;

    fn sub(self, rhs: Self) -> i16 {
        self.0.wrapping_sub(rhs.0) as i16
    }
}

impl From<u16> for SequenceNumber {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// A remote-media timestamp, in the units native to the stream (e.g. 8 kHz samples).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StreamTimestamp(pub u32);

impl From<u32> for StreamTimestamp {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// One packet as seen by the jitter buffer.
///
/// `sequence_number`, `stream_timestamp`, and `payload` arrive from the wire
/// and are never mutated here. `presentation_time_ms` and `duration_ms` are
/// derived fields the buffer fills in on `write` and revises on out-of-order
/// insertion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub sequence_number: SequenceNumber,
    pub stream_timestamp: StreamTimestamp,

    /// Filled in by the buffer: the packet's timestamp converted to the
    /// local millisecond time base.
    pub presentation_time_ms: i64,

    /// Filled in by the buffer: how long this packet occupies on the
    /// timeline, derived from the gap to the packet that followed it.
    pub duration_ms: i64,

    #[serde(with = "bytes_as_vec")]
    pub payload: Bytes,
}

impl Packet {
    /// Builds a packet as received off the wire, with derived fields left at
    /// zero until the buffer processes it in [`JitterBuffer::write`].
    ///
    /// [`JitterBuffer::write`]: crate::buffer::JitterBuffer::write
    pub fn new(sequence_number: u16, stream_timestamp: u32, payload: Bytes) -> Self {
        Self {
            sequence_number: SequenceNumber(sequence_number),
            stream_timestamp: StreamTimestamp(stream_timestamp),
            presentation_time_ms: 0,
            duration_ms: 0,
            payload,
        }
    }
}

mod bytes_as_vec {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        bytes.as_ref().to_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        Ok(Bytes::from(Vec::<u8>::deserialize(d)?))
    }
}
