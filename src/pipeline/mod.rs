//! Analysis run orchestration.
//!
//! This module wires capture workers, stream buffers and the spectral
//! analysis into one fixed-duration run and exposes its progress.
//!
//! # Architecture
//!
//! ```text
//! CaptureWorker (one tokio task per stream)
//!        │ push, drop-oldest
//!        ▼
//! StreamBuffer ──notify──▶ Coordinator::run()  ← async tokio task
//!                                 │
//!                                 ├─ SpectralAnalyzer::analyze
//!                                 ├─ compute_metrics
//!                                 └─ StreamHistory::record
//!
//! SharedStatus (Arc<Mutex<RunStatus>>) ←─── read by progress reporters
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lyrebird_analyzer::audio::FfmpegLauncher;
//! use lyrebird_analyzer::config::AppConfig;
//! use lyrebird_analyzer::pipeline::Coordinator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let launcher = FfmpegLauncher::new(config.decoder.clone(), config.analysis.sample_rate);
//!
//!     let result = Coordinator::new(config, Arc::new(launcher))?.run().await;
//!     for stream in &result.streams {
//!         println!("{}: {} chunks", stream.name, stream.processed_frames);
//!     }
//!     Ok(())
//! }
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{AnalysisResult, Coordinator, StreamReport, WorkerExit};
pub use state::{lock_status, new_shared_status, RunPhase, RunStatus, SharedStatus};
