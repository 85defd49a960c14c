//! Audio capture: decode source → capture worker → bounded stream buffer.
//!
//! # Pipeline
//!
//! ```text
//! stream URL → DecodeSource (ffmpeg, s16le mono) → CaptureWorker
//!            → pcm decode + zero-pad → AudioFrame → StreamBuffer (drop-oldest)
//! ```
//!
//! The coordinator in [`crate::pipeline`] owns the consumer side of every
//! [`StreamBuffer`].

pub mod buffer;
pub mod capture;
pub mod frame;
pub mod pcm;
pub mod source;

pub use buffer::{RingBuffer, StreamBuffer};
pub use capture::{CaptureExit, CaptureOutcome, CaptureWorker};
pub use frame::{wall_clock_secs, AudioFrame, FrameClock};
pub use pcm::{decode_frame, pcm_s16le_to_f32, BYTES_PER_SAMPLE};
pub use source::{DecodeSource, FfmpegLauncher, FfmpegSource, SourceError, SourceFactory};

// test-only re-export so the capture and pipeline tests can import the mocks
// without `use lyrebird_analyzer::audio::source::MockSource`.
#[cfg(test)]
pub use source::{MockSource, MockSourceFactory};
