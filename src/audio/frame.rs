//! The unit of work passed from a capture worker to the coordinator.

use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One fixed-length window of mono audio from a single stream.
///
/// Samples are normalised to `[-1.0, 1.0)`. The length is the run's frame
/// length and never changes during a run (short reads are zero-padded).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Name of the stream that produced this frame.
    pub stream_id: String,
    /// Wall-clock capture time in seconds since the UNIX epoch.
    pub timestamp: f64,
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(stream_id: impl Into<String>, timestamp: f64, samples: Vec<f32>) -> Self {
        Self {
            stream_id: stream_id.into(),
            timestamp,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Current wall-clock time in seconds since the UNIX epoch.
///
/// A clock set before 1970 reads as `0.0`.
pub fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// FrameClock
// ---------------------------------------------------------------------------

/// Per-stream timestamp source that never goes backwards, even if the
/// system clock is stepped during a run.
#[derive(Debug, Default)]
pub struct FrameClock {
    last: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp the next frame from the wall clock.
    pub fn now(&mut self) -> f64 {
        self.observe(wall_clock_secs())
    }

    /// Clamp `t` so it is not earlier than any previously returned stamp.
    pub fn observe(&mut self, t: f64) -> f64 {
        if t > self.last {
            self.last = t;
        }
        self.last
    }
}
