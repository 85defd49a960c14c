//! Per-stream capture worker.
//!
//! A [`CaptureWorker`] owns one [`DecodeSource`] and loops: read one frame's
//! worth of bytes, decode and timestamp it, push it into the stream's
//! [`StreamBuffer`]. It checks the shared `running` flag before every read
//! and always terminates its source on the way out.
//!
//! A zero-byte read means the source is gone; the worker logs a warning and
//! exits without touching the rest of the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::frame::FrameClock;
use super::pcm::{decode_frame, BYTES_PER_SAMPLE};
use super::source::DecodeSource;
use super::{AudioFrame, StreamBuffer};

// ---------------------------------------------------------------------------
// CaptureOutcome
// ---------------------------------------------------------------------------

/// Why a capture worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureExit {
    /// The running flag was cleared.
    Stopped,
    /// The source returned zero bytes.
    SourceUnavailable,
    /// The source returned an I/O error.
    ReadError,
}

/// Counters reported by a worker when it exits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureOutcome {
    /// Frames pushed into the buffer (including ones later evicted).
    pub frames: u64,
    /// Short reads that were zero-padded to the frame length.
    pub truncated_reads: u64,
    pub exit: CaptureExit,
}

// ---------------------------------------------------------------------------
// CaptureWorker
// ---------------------------------------------------------------------------

/// Reads fixed-size frames from one decode source into one stream buffer.
pub struct CaptureWorker {
    stream_id: String,
    source: Box<dyn DecodeSource>,
    frame_len: usize,
    buffer: Arc<StreamBuffer>,
    running: Arc<AtomicBool>,
}

impl CaptureWorker {
    pub fn new(
        stream_id: impl Into<String>,
        source: Box<dyn DecodeSource>,
        frame_len: usize,
        buffer: Arc<StreamBuffer>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            source,
            frame_len,
            buffer,
            running,
        }
    }

    /// Run until the flag clears or the source ends, then terminate the
    /// source.
    pub async fn run(mut self) -> CaptureOutcome {
        let id = self.stream_id.clone();
        let wanted = self.frame_len * BYTES_PER_SAMPLE;
        let mut clock = FrameClock::new();
        let mut frames = 0u64;
        let mut truncated_reads = 0u64;

        log::info!("capture[{id}]: started ({} samples/frame)", self.frame_len);

        let exit = loop {
            if !self.running.load(Ordering::SeqCst) {
                break CaptureExit::Stopped;
            }

            let bytes = match self.source.read(wanted).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("capture[{id}]: {e}");
                    break CaptureExit::ReadError;
                }
            };

            if bytes.is_empty() {
                log::warn!("capture[{id}]: no data from stream, source unavailable");
                break CaptureExit::SourceUnavailable;
            }

            let (samples, padded) = decode_frame(&bytes, self.frame_len);
            if padded {
                truncated_reads += 1;
                log::debug!(
                    "capture[{id}]: short read ({} of {wanted} bytes), zero-padded",
                    bytes.len()
                );
            }

            let evicted = self
                .buffer
                .push(AudioFrame::new(id.as_str(), clock.now(), samples));
            if evicted {
                log::trace!("capture[{id}]: buffer full, dropped oldest frame");
            }
            frames += 1;
        };

        self.source.terminate().await;
        log::info!("capture[{id}]: stopped after {frames} frames ({exit:?})");

        CaptureOutcome {
            frames,
            truncated_reads,
            exit,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::audio::pcm::encode_s16le;
    use crate::audio::MockSource;

    fn setup(capacity: usize) -> (Arc<StreamBuffer>, Arc<AtomicBool>) {
        (
            Arc::new(StreamBuffer::new(capacity, Arc::new(Notify::new()))),
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[tokio::test]
    async fn dead_source_exits_as_unavailable() {
        let (buffer, running) = setup(4);
        let source = MockSource::dead();
        let terminations = source.terminations();

        let outcome = CaptureWorker::new("raw", Box::new(source), 4, buffer.clone(), running)
            .run()
            .await;

        assert_eq!(outcome.exit, CaptureExit::SourceUnavailable);
        assert_eq!(outcome.frames, 0);
        assert!(buffer.is_empty());
        assert_eq!(terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn frames_are_decoded_padded_and_ordered() {
        let (buffer, running) = setup(8);
        let full = encode_s16le(&[16_384, 16_384, 16_384, 16_384]);
        let short = encode_s16le(&[-16_384]);
        let source = MockSource::scripted(vec![full, short]);

        let outcome = CaptureWorker::new("raw", Box::new(source), 4, buffer.clone(), running)
            .run()
            .await;

        assert_eq!(outcome.frames, 2);
        assert_eq!(outcome.truncated_reads, 1);
        assert_eq!(outcome.exit, CaptureExit::SourceUnavailable);

        let first = buffer.try_pop().unwrap();
        let second = buffer.try_pop().unwrap();
        assert_eq!(first.stream_id, "raw");
        assert_eq!(first.samples, vec![0.5; 4]);
        assert_eq!(second.samples, vec![-0.5, 0.0, 0.0, 0.0]);
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn full_buffer_drops_oldest_without_blocking() {
        let (buffer, running) = setup(2);
        let chunks = (1..=5i16).map(|v| encode_s16le(&[v; 2])).collect();
        let source = MockSource::scripted(chunks);

        let outcome = CaptureWorker::new("bird", Box::new(source), 2, buffer.clone(), running)
            .run()
            .await;

        assert_eq!(outcome.frames, 5);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.overflow_count(), 3);
        let kept: Vec<f32> = std::iter::from_fn(|| buffer.try_pop())
            .map(|f| f.samples[0] * 32_768.0)
            .collect();
        assert_eq!(kept, vec![4.0, 5.0]);
    }

    #[tokio::test]
    async fn clearing_flag_stops_worker() {
        let (buffer, running) = setup(4);
        let source = MockSource::endless(encode_s16le(&[0; 4]), Duration::from_millis(5));
        let terminations = source.terminations();

        let worker = CaptureWorker::new("raw", Box::new(source), 4, buffer.clone(), running.clone());
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should observe the flag")
            .expect("worker should not panic");

        assert_eq!(outcome.exit, CaptureExit::Stopped);
        assert!(outcome.frames > 0);
        assert_eq!(terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_error_ends_worker() {
        let (buffer, running) = setup(4);
        let outcome = CaptureWorker::new("raw", Box::new(MockSource::failing()), 4, buffer, running)
            .run()
            .await;
        assert_eq!(outcome.exit, CaptureExit::ReadError);
    }

    #[tokio::test]
    async fn flag_already_cleared_reads_nothing() {
        let (buffer, running) = setup(4);
        running.store(false, Ordering::SeqCst);
        let source = MockSource::endless(encode_s16le(&[0; 4]), Duration::ZERO);
        let terminations = source.terminations();

        let outcome = CaptureWorker::new("raw", Box::new(source), 4, buffer.clone(), running)
            .run()
            .await;

        assert_eq!(outcome.exit, CaptureExit::Stopped);
        assert_eq!(outcome.frames, 0);
        assert_eq!(terminations.load(Ordering::SeqCst), 1);
    }
}
