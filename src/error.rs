use thiserror::Error;

/// Errors returned by the fallible parts of [`JitterBuffer`](crate::buffer::JitterBuffer)'s
/// public API.
///
/// Everything on the steady-state data path (late packets, overflow
/// eviction, reads against an empty buffer) is handled internally and never
/// reaches the caller as an `Err` — see the crate documentation's error
/// handling section.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum JitterBufferError {
    /// `write` was called before [`set_clock`](crate::buffer::JitterBuffer::set_clock).
    #[error("jitter buffer write called before a clock was configured")]
    ClockNotConfigured,

    /// The builder was asked to build a buffer with zero slot capacity.
    #[error("jitter buffer capacity must be greater than zero")]
    ZeroCapacity,
}
