//! A fixed-capacity jitter buffer for real-time media packet streams.
//!
//! Packets arrive out of order and at uneven intervals off the network;
//! [`JitterBuffer`] reorders them by sequence number, holds them until a
//! configured delay budget has accumulated, and hands them back to a
//! consumer ticking on its own clock in presentation-time order. It also
//! maintains an RFC 3550 §6.4.1 inter-arrival jitter estimate alongside the
//! buffering logic.
//!
//! See [`buffer::JitterBuffer`] for the full API; [`clock::MediaClock`] is
//! the one collaborator callers must supply.

pub mod buffer;
pub mod clock;
pub mod error;
pub mod jitter;
pub mod packet;

pub use buffer::{JitterBuffer, JitterBufferBuilder, QUEUE_SIZE};
pub use clock::{IdentityClock, LinearClock, MediaClock, MediaFormat};
pub use error::JitterBufferError;
pub use jitter::JitterEstimator;
pub use packet::{Packet, SequenceNumber, StreamTimestamp};
