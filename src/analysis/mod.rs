//! Spectral analysis: frame → [`SpectralSlice`] → [`QualityMetrics`] →
//! [`StreamHistory`].
//!
//! Everything here is synchronous and free of shared state; the coordinator
//! calls it serially for each dequeued frame, and clip correlation reuses it
//! for WAV files.

pub mod history;
pub mod quality;
pub mod sentinel;
pub mod spectrum;
pub mod stats;

pub use history::{filter_effectiveness, FilterEffectiveness, SeriesPoint, StreamHistory};
pub use quality::{compute_metrics, Band, QualityMetrics};
pub use spectrum::{SpectralAnalyzer, SpectralSlice, DB_FLOOR};
pub use stats::Distribution;
