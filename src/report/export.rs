//! JSON export documents.
//!
//! Key names follow the files written by the earlier analysis scripts so
//! existing notebooks keep working. Non-finite values are written as the
//! strings `"-Infinity"`, `"Infinity"` and `"NaN"`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use serde::Serialize;

use crate::analysis::{Distribution, FilterEffectiveness, QualityMetrics, SpectralSlice};
use crate::birdnet::{ClipAnalysis, CorrelationStats};
use crate::pipeline::AnalysisResult;

pub const EXPORT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Stream analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub version: String,
    /// RFC 3339, local time.
    pub timestamp: String,
    pub sample_rate: u32,
    pub chunk_duration: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamExport {
    /// Metrics of the last analysed frame.
    pub stats: QualityMetrics,
    /// Seconds since the run started, one per analysed frame.
    pub timestamp_history: Vec<f64>,
    #[serde(with = "crate::analysis::sentinel::vec")]
    pub snr_history: Vec<f64>,
    #[serde(with = "crate::analysis::sentinel::vec")]
    pub bird_power_history: Vec<f64>,
    #[serde(with = "crate::analysis::sentinel::vec")]
    pub low_power_history: Vec<f64>,
    /// Spectrum of the last analysed frame.
    pub latest_slice: Option<SpectralSlice>,
    #[serde(with = "crate::analysis::sentinel")]
    pub snr_median: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub snr_std: f64,
    pub chunk_count: usize,
    pub distribution: Distribution,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    /// Streams with at least one analysed frame, by name.
    pub streams: BTreeMap<String, StreamExport>,
    pub effectiveness: Vec<FilterEffectiveness>,
}

/// Build the export document for a finished run.
pub fn export_document(result: &AnalysisResult) -> ExportDocument {
    let streams = result
        .streams
        .iter()
        .filter_map(|s| {
            let stats = s.history.latest_metrics()?.clone();
            let distribution = s.snr_distribution.clone()?;
            let export = StreamExport {
                stats,
                timestamp_history: s.history.timestamps(),
                snr_history: s.history.snr_series(),
                bird_power_history: s.history.bird_power_series(),
                low_power_history: s.history.low_power_series(),
                latest_slice: s.history.latest_slice.clone(),
                snr_median: distribution.median,
                snr_std: distribution.std,
                chunk_count: s.processed_frames,
                distribution,
            };
            Some((s.name.clone(), export))
        })
        .collect();

    ExportDocument {
        metadata: ExportMetadata {
            version: EXPORT_VERSION.to_string(),
            timestamp: Local::now().to_rfc3339(),
            sample_rate: result.sample_rate,
            chunk_duration: result.chunk_duration_secs,
        },
        streams,
        effectiveness: result.effectiveness.clone(),
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMetadata {
    pub version: String,
    pub timestamp: String,
    pub hours_analyzed: u32,
    pub clips_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationExport<'a> {
    pub metadata: CorrelationMetadata,
    pub correlation_stats: &'a CorrelationStats,
    pub clip_analysis: &'a BTreeMap<String, ClipAnalysis>,
}

pub fn correlation_document<'a>(
    stats: &'a CorrelationStats,
    clips: &'a BTreeMap<String, ClipAnalysis>,
    hours: u32,
    clips_dir: &Path,
) -> CorrelationExport<'a> {
    CorrelationExport {
        metadata: CorrelationMetadata {
            version: EXPORT_VERSION.to_string(),
            timestamp: Local::now().to_rfc3339(),
            hours_analyzed: hours,
            clips_directory: clips_dir.to_path_buf(),
        },
        correlation_stats: stats,
        clip_analysis: clips,
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write `value` as pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
