//! Run coordinator: starts one capture worker per stream, drains and
//! analyses their frames until the deadline, then shuts everything down.
//!
//! # Run flow
//!
//! ```text
//! Idle
//!   └─▶ open source + spawn CaptureWorker per stream                   [Running]
//!         warm-up, then loop:
//!           non-blocking pass over every StreamBuffer
//!             └─▶ SpectralAnalyzer → compute_metrics → StreamHistory
//!           nothing drained → wait on the shared notifier (bounded)
//!         until deadline or running cleared externally
//!   └─▶ running = false                                                [Stopping]
//!         join each worker under a timeout, abort on timeout
//!   └─▶ AnalysisResult                                                 [Done]
//! ```
//!
//! A stream that fails to open, dies or hangs never stops the others, and
//! the run always reaches `Done`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::analysis::{
    compute_metrics, filter_effectiveness, Distribution, FilterEffectiveness, SpectralAnalyzer,
    StreamHistory,
};
use crate::audio::{CaptureOutcome, CaptureWorker, SourceFactory, StreamBuffer};
use crate::config::{AppConfig, ConfigError, StreamConfig};

use super::state::{lock_status, new_shared_status, RunPhase, SharedStatus};

// ---------------------------------------------------------------------------
// WorkerExit
// ---------------------------------------------------------------------------

/// How a stream's capture worker ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerExit {
    /// The worker returned on its own.
    Completed(CaptureOutcome),
    /// The decode source could not be opened.
    FailedToStart(String),
    /// The worker task panicked.
    Panicked(String),
    /// The worker did not finish within the join timeout and was aborted.
    TimedOut,
}

impl WorkerExit {
    pub fn describe(&self) -> String {
        match self {
            WorkerExit::Completed(outcome) => format!(
                "{:?} after {} frames ({} truncated)",
                outcome.exit, outcome.frames, outcome.truncated_reads
            ),
            WorkerExit::FailedToStart(e) => format!("failed to start: {e}"),
            WorkerExit::Panicked(e) => format!("panicked: {e}"),
            WorkerExit::TimedOut => "did not stop in time".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

/// Everything one stream produced during a run.
#[derive(Debug, Clone)]
pub struct StreamReport {
    pub name: String,
    pub url: String,
    pub history: StreamHistory,
    pub snr_distribution: Option<Distribution>,
    /// Frames dequeued and analysed; always `history.len()`.
    pub processed_frames: usize,
    /// Frames evicted unseen because the buffer was full.
    pub overflow_count: u64,
    pub exit: WorkerExit,
}

/// Final, read-only output of a run.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub started_at: DateTime<Local>,
    pub elapsed_secs: f64,
    pub sample_rate: u32,
    pub chunk_duration_secs: f64,
    /// Streams in configuration order.
    pub streams: Vec<StreamReport>,
    /// Consecutive-stream comparisons in configuration order.
    pub effectiveness: Vec<FilterEffectiveness>,
    /// `true` when the run stopped before its deadline.
    pub interrupted: bool,
    pub final_phase: RunPhase,
}

impl AnalysisResult {
    pub fn stream(&self, name: &str) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.name == name)
    }

    pub fn total_frames(&self) -> usize {
        self.streams.iter().map(|s| s.processed_frames).sum()
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct StreamSlot {
    config: StreamConfig,
    buffer: Arc<StreamBuffer>,
    worker: Result<JoinHandle<CaptureOutcome>, String>,
    history: StreamHistory,
}

/// Drives one analysis run.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use lyrebird_analyzer::audio::FfmpegLauncher;
/// use lyrebird_analyzer::config::AppConfig;
/// use lyrebird_analyzer::pipeline::Coordinator;
///
/// # async fn example() -> Result<(), lyrebird_analyzer::config::ConfigError> {
/// let config = AppConfig::default();
/// let launcher = FfmpegLauncher::new(config.decoder.clone(), config.analysis.sample_rate);
/// let coordinator = Coordinator::new(config, Arc::new(launcher))?;
///
/// let stop = coordinator.interrupt_handle();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     stop.store(false, std::sync::atomic::Ordering::SeqCst);
/// });
///
/// let result = coordinator.run().await;
/// println!("{} frames analysed", result.total_frames());
/// # Ok(())
/// # }
/// ```
pub struct Coordinator {
    config: AppConfig,
    factory: Arc<dyn SourceFactory>,
    running: Arc<AtomicBool>,
    status: SharedStatus,
}

impl Coordinator {
    /// Validate `config` and prepare a run. Nothing is opened until
    /// [`run`](Self::run).
    pub fn new(config: AppConfig, factory: Arc<dyn SourceFactory>) -> Result<Self, ConfigError> {
        config.validate()?;
        let status = new_shared_status(config.analysis.duration_secs as f64);
        Ok(Self {
            config,
            factory,
            running: Arc::new(AtomicBool::new(true)),
            status,
        })
    }

    /// The shared running flag. Storing `false` stops the run early, and a
    /// flag cleared before [`run`](Self::run) starts is honoured.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run to completion and return whatever was collected.
    pub async fn run(self) -> AnalysisResult {
        let analysis = self.config.analysis.clone();
        let frame_len = analysis.frame_len();
        let analyzer = SpectralAnalyzer::new(analysis.sample_rate, frame_len);
        let ready = Arc::new(Notify::new());

        let started_at = Local::now();
        let start = Instant::now();
        let deadline = start + analysis.duration();

        // ── Idle → Running ───────────────────────────────────────────────
        let mut slots = self.start_workers(frame_len, &ready);
        {
            let mut st = lock_status(&self.status);
            st.frames = frame_counts(&slots);
            st.advance(RunPhase::Running);
        }
        log::info!(
            "Starting analysis of {} streams for {}s ({} samples/frame)",
            slots.len(),
            analysis.duration_secs,
            frame_len
        );

        if self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(analysis.warmup().min(analysis.duration())).await;
        }

        let mut next_progress = start + analysis.progress_interval();
        let mut interrupted = false;

        loop {
            if !self.running.load(Ordering::SeqCst) {
                interrupted = Instant::now() < deadline;
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let mut drained = false;
            for slot in slots.iter_mut() {
                if let Some(frame) = slot.buffer.try_pop() {
                    let slice = analyzer.analyze(&frame.samples);
                    let metrics = compute_metrics(&frame.samples, &slice);
                    slot.history.record(frame.timestamp, slice, metrics);
                    drained = true;
                }
            }

            {
                let mut st = lock_status(&self.status);
                st.elapsed_secs = start.elapsed().as_secs_f64();
                if drained {
                    st.frames = frame_counts(&slots);
                }
                if now >= next_progress {
                    log::info!(
                        "Progress: {:.0}s / {}s ({:.0}s remaining)",
                        st.elapsed_secs,
                        analysis.duration_secs,
                        st.remaining_secs()
                    );
                    next_progress += analysis.progress_interval().max(Duration::from_millis(1));
                }
            }

            if drained {
                tokio::task::yield_now().await;
            } else {
                let wait = analysis
                    .poll_timeout()
                    .min(deadline.saturating_duration_since(now));
                let _ = tokio::time::timeout(wait, ready.notified()).await;
            }
        }

        if interrupted {
            log::info!("Analysis interrupted");
        }

        // ── Running → Stopping ───────────────────────────────────────────
        self.running.store(false, Ordering::SeqCst);
        lock_status(&self.status).advance(RunPhase::Stopping);

        let join_timeout = analysis.join_timeout();
        let mut streams = Vec::with_capacity(slots.len());
        for slot in slots {
            let exit = join_worker(&slot.config.name, slot.worker, join_timeout).await;
            let processed_frames = slot.history.len();
            log::info!("  {}: {} chunks", slot.config.name, processed_frames);

            streams.push(StreamReport {
                snr_distribution: slot.history.snr_distribution(),
                processed_frames,
                overflow_count: slot.buffer.overflow_count(),
                name: slot.config.name,
                url: slot.config.url,
                history: slot.history,
                exit,
            });
        }

        let effectiveness =
            filter_effectiveness(streams.iter().map(|s| (s.name.as_str(), &s.history)));

        // ── Stopping → Done ──────────────────────────────────────────────
        let elapsed_secs = start.elapsed().as_secs_f64();
        let final_phase = {
            let mut st = lock_status(&self.status);
            st.elapsed_secs = elapsed_secs;
            st.frames = streams
                .iter()
                .map(|s| (s.name.clone(), s.processed_frames))
                .collect();
            st.advance(RunPhase::Done);
            st.phase
        };

        let result = AnalysisResult {
            started_at,
            elapsed_secs,
            sample_rate: analysis.sample_rate,
            chunk_duration_secs: analysis.chunk_duration_secs,
            streams,
            effectiveness,
            interrupted,
            final_phase,
        };
        log::info!(
            "Analysis complete: {} chunks in {:.1}s",
            result.total_frames(),
            elapsed_secs
        );
        result
    }

    /// Open every source and spawn its worker. A stream whose source fails
    /// to open keeps an empty slot so it still shows up in the results.
    fn start_workers(&self, frame_len: usize, ready: &Arc<Notify>) -> Vec<StreamSlot> {
        self.config
            .streams
            .iter()
            .map(|stream| {
                let buffer = Arc::new(StreamBuffer::new(
                    self.config.analysis.buffer_capacity,
                    Arc::clone(ready),
                ));

                let worker = match self.factory.open(stream) {
                    Ok(source) => {
                        log::info!("Started capture for {} stream", stream.name);
                        let worker = CaptureWorker::new(
                            stream.name.as_str(),
                            source,
                            frame_len,
                            Arc::clone(&buffer),
                            Arc::clone(&self.running),
                        );
                        Ok(tokio::spawn(worker.run()))
                    }
                    Err(e) => {
                        log::warn!("Could not start {} stream: {e}", stream.name);
                        Err(e.to_string())
                    }
                };

                StreamSlot {
                    config: stream.clone(),
                    buffer,
                    worker,
                    history: StreamHistory::new(),
                }
            })
            .collect()
    }
}

/// Per-stream frame counts, in configuration order.
fn frame_counts(slots: &[StreamSlot]) -> Vec<(String, usize)> {
    slots
        .iter()
        .map(|s| (s.config.name.clone(), s.history.len()))
        .collect()
}

/// Wait for one worker, aborting it if it outlives `timeout`.
async fn join_worker(
    name: &str,
    worker: Result<JoinHandle<CaptureOutcome>, String>,
    timeout: Duration,
) -> WorkerExit {
    let mut handle = match worker {
        Ok(handle) => handle,
        Err(e) => return WorkerExit::FailedToStart(e),
    };

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(outcome)) => WorkerExit::Completed(outcome),
        Ok(Err(e)) => {
            log::warn!("capture[{name}]: worker failed: {e}");
            WorkerExit::Panicked(e.to_string())
        }
        Err(_) => {
            // Dropping the aborted task drops its source, which kills the
            // decoder process.
            handle.abort();
            log::warn!("capture[{name}]: did not stop within {timeout:?}, aborted");
            WorkerExit::TimedOut
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
