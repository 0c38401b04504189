//! The media clock seam: converts remote stream timestamps into the local
//! millisecond time base the buffer reasons in.

/// The media format a [`MediaClock`] is configured for.
///
/// `Any` is a sentinel meaning "no particular format" — callers may pass it
/// to [`crate::buffer::JitterBuffer::set_format`] without it ever reaching
/// the clock.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum MediaFormat {
    /// No format has been negotiated yet; never forwarded to a clock.
    Any,
    /// A fixed sample rate, in Hz (e.g. 8000 for G.711, 48000 for Opus).
    SampleRate(u32),
}

/// Converts a remote-media timestamp into the local millisecond time base.
///
/// Implementations must be pure and non-blocking: the buffer calls `time_of`
/// and `now` on every [`write`](crate::buffer::JitterBuffer::write) and
/// assumes neither suspends.
pub trait MediaClock: Send {
    /// Configures the sample rate this clock converts at. Called by the
    /// buffer whenever a non-`Any` format is set.
    fn set_format(&mut self, format: MediaFormat);

    /// Maps a wire timestamp (in stream units) to the local millisecond base.
    fn time_of(&mut self, stream_timestamp: u32) -> i64;

    /// The current wall-clock time, in local milliseconds. Injected rather
    /// than read from the OS so callers can drive deterministic tests.
    fn now(&self) -> i64;

    /// Clears any internal rollover/format tracking, returning the clock to
    /// its just-constructed state.
    fn reset(&mut self);
}

/// A clock whose `time_of` is the identity function.
///
/// Used in tests and by the literal scenarios in the module documentation,
/// where `time_of(ts) == ts`. `now()` is driven explicitly via
/// [`IdentityClock::set_now`] rather than reading a real wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityClock {
    now_ms: i64,
}

impl IdentityClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value the next call to [`MediaClock::now`] will return.
    pub fn set_now(&mut self, now_ms: i64) {
        self.now_ms = now_ms;
    }
}

impl MediaClock for IdentityClock {
    fn set_format(&mut self, _format: MediaFormat) {}

    fn time_of(&mut self, stream_timestamp: u32) -> i64 {
        stream_timestamp as i64
    }

    fn now(&self) -> i64 {
        self.now_ms
    }

    fn reset(&mut self) {
        self.now_ms = 0;
    }
}

/// A clock for a stream running at a fixed sample rate with no rollover
/// compensation beyond the buffer's own sequence-wraparound handling.
///
/// `time_of` scales stream units to milliseconds: `ms = ts * 1000 / rate`.
#[derive(Clone, Copy, Debug)]
pub struct LinearClock {
    sample_rate_hz: u32,
    wall_clock: fn() -> i64,
}

impl LinearClock {
    /// Builds a clock at the given sample rate, sourcing wall-clock time
    /// from the provided function (typically a thin wrapper over a
    /// monotonic OS clock; kept injectable for testability).
    pub fn new(sample_rate_hz: u32, wall_clock: fn() -> i64) -> Self {
        Self {
            sample_rate_hz: sample_rate_hz.max(1),
            wall_clock,
        }
    }
}

impl MediaClock for LinearClock {
    fn set_format(&mut self, format: MediaFormat) {
        if let MediaFormat::SampleRate(rate) = format {
            self.sample_rate_hz = rate.max(1);
        }
    }

    fn time_of(&mut self, stream_timestamp: u32) -> i64 {
        (stream_timestamp as i64 * 1000) / self.sample_rate_hz as i64
    }

    fn now(&self) -> i64 {
        (self.wall_clock)()
    }

    fn reset(&mut self) {}
}
