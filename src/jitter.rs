//! The RFC 3550 §6.4.1 inter-arrival jitter estimator, factored out of the
//! buffer so it can be exercised in isolation.

/// Running inter-arrival jitter estimate.
///
/// Tracks the previous arrival's wall-clock (`r`) and presentation-time (`s`)
/// stamps, and folds each new arrival into an exponentially smoothed
/// estimate `J` via `J += (|D| - J) / 16`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JitterEstimator {
    last_arrival_wall_ms: Option<i64>,
    last_packet_time_ms: Option<i64>,
    estimate: f64,
    max: f64,
}

impl JitterEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one arrival into the estimate.
    ///
    /// `now` is the wall-clock arrival time (local ms); `presentation_time`
    /// is the packet's presentation time (remote ms converted to local base).
    pub fn observe(&mut self, now: i64, presentation_time: i64) {
        if let (Some(r), Some(s)) = (self.last_arrival_wall_ms, self.last_packet_time_ms) {
            let d = ((now - r) - (presentation_time - s)).unsigned_abs() as f64;
            self.estimate += (d - self.estimate) / 16.0;
            if self.estimate > self.max {
                self.max = self.estimate;
            }
        }
        self.last_packet_time_ms = Some(presentation_time);
        self.last_arrival_wall_ms = Some(now);
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Clears the running estimate and the previous-arrival stamps, without
    /// affecting anything else in the owning buffer. Not called by
    /// [`JitterBuffer::reset`](crate::buffer::JitterBuffer::reset) — see
    /// that method's documentation.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
