//! Correlate BirdNET detection confidence with the audio quality of the
//! clips that produced each detection.
//!
//! Each clip is analysed with the same [`SpectralAnalyzer`] and
//! [`compute_metrics`] used for live streams, over the whole clip as a single
//! frame.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::analysis::{compute_metrics, SpectralAnalyzer};
use crate::birdnet::detections::Detection;

/// Width of the SNR bins used to average confidence.
pub const SNR_BIN_WIDTH_DB: f64 = 5.0;

/// Number of SNR bins; together they cover `[0, 55)` dB.
pub const SNR_BIN_COUNT: usize = 11;

/// Minimum clips per species before per-species stats are reported.
pub const MIN_SPECIES_SAMPLES: usize = 3;

// ---------------------------------------------------------------------------
// ClipError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("failed to read WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("clip contains no samples")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Clip analysis
// ---------------------------------------------------------------------------

/// Quality of one detection clip alongside the detection that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipAnalysis {
    pub clip_name: String,
    /// Bird-band power minus low-band power, dB.
    #[serde(with = "crate::analysis::sentinel")]
    pub snr: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub bird_power: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub low_power: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub rms: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub peak: f64,
    pub species: String,
    pub confidence: f64,
    pub timestamp: Option<String>,
}

/// Read a WAV file as mono samples in `[-1, 1)`. Multi-channel audio is
/// averaged per frame; integer samples are scaled by their bit depth.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), ClipError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    if mono.is_empty() {
        return Err(ClipError::Empty);
    }
    Ok((mono, spec.sample_rate))
}

/// Analyse one clip for the given detection.
pub fn analyze_clip(path: &Path, detection: &Detection) -> Result<ClipAnalysis, ClipError> {
    let (samples, sample_rate) = read_wav_mono(path)?;

    let analyzer = SpectralAnalyzer::new(sample_rate, samples.len());
    let slice = analyzer.analyze(&samples);
    let metrics = compute_metrics(&samples, &slice);

    let clip_name = detection.clip_name.clone().unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    Ok(ClipAnalysis {
        clip_name,
        snr: metrics.snr_bird_to_low_db,
        bird_power: metrics.bird_band_power_db,
        low_power: metrics.low_band_power_db,
        rms: metrics.rms,
        peak: metrics.peak,
        species: detection.species().to_string(),
        confidence: detection.confidence_or_zero(),
        timestamp: detection.datetime().map(|t| t.to_rfc3339()),
    })
}

/// Analyse every detection whose clip exists under `clips_dir`, keyed by clip
/// name. Detections without a clip, or whose file is missing, are skipped;
/// unreadable clips are logged and skipped.
pub fn analyze_detection_clips(
    detections: &[Detection],
    clips_dir: &Path,
) -> BTreeMap<String, ClipAnalysis> {
    let mut results = BTreeMap::new();

    for detection in detections {
        let Some(clip_name) = detection.clip_name.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        let path: PathBuf = clips_dir.join(clip_name);
        if !path.is_file() {
            log::debug!("correlate: clip {} not found", path.display());
            continue;
        }

        match analyze_clip(&path, detection) {
            Ok(analysis) => {
                results.insert(clip_name.to_string(), analysis);
            }
            Err(e) => log::warn!("correlate: skipping {clip_name}: {e}"),
        }
    }

    log::info!("Analyzed {} clips", results.len());
    results
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnrBin {
    #[serde(with = "crate::analysis::sentinel")]
    pub snr_from: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub snr_to: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub avg_confidence: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesStats {
    #[serde(with = "crate::analysis::sentinel")]
    pub avg_snr: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub avg_confidence: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub snr_std: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
}

impl CorrelationStrength {
    /// `|r| > 0.5` strong, `|r| > 0.3` moderate, otherwise (NaN included) weak.
    pub fn from_r(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude > 0.5 {
            CorrelationStrength::Strong
        } else if magnitude > 0.3 {
            CorrelationStrength::Moderate
        } else {
            CorrelationStrength::Weak
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            CorrelationStrength::Strong => {
                "Strong correlation - audio quality significantly affects detection confidence"
            }
            CorrelationStrength::Moderate => {
                "Moderate correlation - audio quality impacts detection confidence"
            }
            CorrelationStrength::Weak => {
                "Weak correlation - other factors may be more important"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationStats {
    /// Pearson correlation between SNR and confidence.
    #[serde(with = "crate::analysis::sentinel")]
    pub correlation: f64,
    pub total_samples: usize,
    #[serde(with = "crate::analysis::sentinel::vec")]
    pub snr_range: Vec<f64>,
    /// Non-empty bins only, in ascending SNR order.
    pub confidence_by_snr: Vec<SnrBin>,
    pub species_stats: BTreeMap<String, SpeciesStats>,
}

impl CorrelationStats {
    pub fn strength(&self) -> CorrelationStrength {
        CorrelationStrength::from_r(self.correlation)
    }
}

/// Relate clip SNR to detection confidence.
///
/// Only clips with a finite SNR and a positive confidence are used. Returns
/// `None` when none qualify.
pub fn correlate(clips: &BTreeMap<String, ClipAnalysis>) -> Option<CorrelationStats> {
    let usable: Vec<&ClipAnalysis> = clips
        .values()
        .filter(|c| c.snr.is_finite() && c.confidence > 0.0)
        .collect();
    if usable.is_empty() {
        return None;
    }

    let snrs: Vec<f64> = usable.iter().map(|c| c.snr).collect();
    let confidences: Vec<f64> = usable.iter().map(|c| c.confidence).collect();

    let snr_min = snrs.iter().copied().fold(f64::INFINITY, f64::min);
    let snr_max = snrs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let confidence_by_snr = (0..SNR_BIN_COUNT)
        .filter_map(|i| {
            let lo = i as f64 * SNR_BIN_WIDTH_DB;
            let hi = lo + SNR_BIN_WIDTH_DB;
            let in_bin: Vec<f64> = usable
                .iter()
                .filter(|c| c.snr >= lo && c.snr < hi)
                .map(|c| c.confidence)
                .collect();
            (!in_bin.is_empty()).then(|| SnrBin {
                snr_from: lo,
                snr_to: hi,
                avg_confidence: mean(&in_bin),
                count: in_bin.len(),
            })
        })
        .collect();

    let mut by_species: BTreeMap<&str, Vec<&ClipAnalysis>> = BTreeMap::new();
    for clip in &usable {
        by_species.entry(clip.species.as_str()).or_default().push(clip);
    }
    let species_stats = by_species
        .into_iter()
        .filter(|(_, list)| list.len() >= MIN_SPECIES_SAMPLES)
        .map(|(species, list)| {
            let snr: Vec<f64> = list.iter().map(|c| c.snr).collect();
            let conf: Vec<f64> = list.iter().map(|c| c.confidence).collect();
            let stats = SpeciesStats {
                avg_snr: mean(&snr),
                avg_confidence: mean(&conf),
                snr_std: population_std(&snr),
                count: list.len(),
            };
            (species.to_string(), stats)
        })
        .collect();

    Some(CorrelationStats {
        correlation: pearson(&snrs, &confidences),
        total_samples: usable.len(),
        snr_range: vec![snr_min, snr_max],
        confidence_by_snr,
        species_stats,
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Pearson r; NaN when either series is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let mx = mean(xs);
    let my = mean(ys);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    sxy / (sxx * syy).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
