//! BirdNET-Go integration.
//!
//! - [`client`]: HTTP client for the BirdNET-Go REST API.
//! - [`detections`]: detection records and summary analytics.
//! - [`correlate`]: clip quality vs. detection confidence.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use lyrebird_analyzer::birdnet::{BirdnetClient, DetectionQuery, DetectionSet};
//! use lyrebird_analyzer::config::BirdnetConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = BirdnetClient::from_config(&BirdnetConfig::default());
//!     if client.test_connection().await {
//!         let list = client
//!             .get_all_detections(&DetectionQuery::default(), 1_000)
//!             .await
//!             .unwrap_or_default();
//!         if let Some(summary) = DetectionSet::from(list).summary() {
//!             println!("{} species", summary.unique_species);
//!         }
//!     }
//! }
//! ```

pub mod client;
pub mod correlate;
pub mod detections;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{BirdnetClient, BirdnetError, DetectionQuery};
pub use correlate::{
    analyze_clip, analyze_detection_clips, correlate, ClipAnalysis, ClipError, CorrelationStats,
    CorrelationStrength, SnrBin, SpeciesStats,
};
pub use detections::{
    ConfidenceHistogram, Detection, DetectionExport, DetectionSet, DetectionSummary,
    DetectionTime, HistogramBin, TimeRange,
};
