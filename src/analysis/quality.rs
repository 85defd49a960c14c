//! Scalar quality indicators for one analysed frame.
//!
//! | Metric | Definition |
//! |--------|------------|
//! | RMS / peak | from samples, in dB with a `1e-10` floor |
//! | Crest factor | `peak / (rms + floor)`, also in dB |
//! | Band power | mean `power_db` over a frequency mask |
//! | SNR | bird band minus low band, bird band minus mid band |
//! | Centroid | `Σ f·p / Σ p` with `p = power_db` |
//! | Rolloff | first bin where cumulative `power_db` reaches 85% of the total |
//!
//! Bands: low `< 1 kHz`, mid `[1, 3) kHz`, bird `[3, 8] kHz`, high `> 8 kHz`.
//! An empty mask yields `-inf` for that band; subtractions involving it may
//! give `-inf`, `inf` or NaN and are passed through as-is.

use serde::{Deserialize, Serialize};

use super::spectrum::{SpectralSlice, DB_FLOOR};

pub const LOW_BAND_MAX_HZ: f64 = 1_000.0;
pub const MID_BAND_MAX_HZ: f64 = 3_000.0;
pub const BIRD_BAND_MIN_HZ: f64 = 3_000.0;
pub const BIRD_BAND_MAX_HZ: f64 = 8_000.0;

/// Fraction of cumulative spectral power below the rolloff frequency.
pub const ROLLOFF_FRACTION: f64 = 0.85;

// ---------------------------------------------------------------------------
// Band
// ---------------------------------------------------------------------------

/// The four analysis bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Low,
    Mid,
    Bird,
    High,
}

impl Band {
    pub const ALL: [Band; 4] = [Band::Low, Band::Mid, Band::Bird, Band::High];

    /// Whether `freq` (Hz) falls in this band.
    pub fn contains(self, freq: f64) -> bool {
        match self {
            Band::Low => freq < LOW_BAND_MAX_HZ,
            Band::Mid => (LOW_BAND_MAX_HZ..MID_BAND_MAX_HZ).contains(&freq),
            Band::Bird => (BIRD_BAND_MIN_HZ..=BIRD_BAND_MAX_HZ).contains(&freq),
            Band::High => freq > BIRD_BAND_MAX_HZ,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Low => "Low Freq (<1kHz)",
            Band::Mid => "Mid Freq (1-3kHz)",
            Band::Bird => "Bird Freq (3-8kHz)",
            Band::High => "High Freq (>8kHz)",
        }
    }

    /// Mean `power_db` over the bins inside this band, `-inf` if none are.
    pub fn mean_power_db(self, slice: &SpectralSlice) -> f64 {
        let (sum, count) = slice
            .frequencies
            .iter()
            .zip(&slice.power_db)
            .filter(|(&f, _)| self.contains(f))
            .fold((0.0, 0usize), |(s, n), (_, &p)| (s + p, n + 1));

        if count == 0 {
            f64::NEG_INFINITY
        } else {
            sum / count as f64
        }
    }
}

// ---------------------------------------------------------------------------
// QualityMetrics
// ---------------------------------------------------------------------------

/// Quality indicators for one frame. Serialised names match the JSON export
/// consumed by existing tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    #[serde(with = "crate::analysis::sentinel")]
    pub rms: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub rms_db: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub peak: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub peak_db: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub crest_factor: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub crest_factor_db: f64,
    #[serde(rename = "low_freq_power", with = "crate::analysis::sentinel")]
    pub low_band_power_db: f64,
    #[serde(rename = "mid_freq_power", with = "crate::analysis::sentinel")]
    pub mid_band_power_db: f64,
    #[serde(rename = "bird_freq_power", with = "crate::analysis::sentinel")]
    pub bird_band_power_db: f64,
    #[serde(rename = "high_freq_power", with = "crate::analysis::sentinel")]
    pub high_band_power_db: f64,
    #[serde(rename = "snr_bird_to_low", with = "crate::analysis::sentinel")]
    pub snr_bird_to_low_db: f64,
    #[serde(rename = "snr_bird_to_mid", with = "crate::analysis::sentinel")]
    pub snr_bird_to_mid_db: f64,
    #[serde(rename = "spectral_centroid", with = "crate::analysis::sentinel")]
    pub spectral_centroid_hz: f64,
    #[serde(rename = "spectral_rolloff", with = "crate::analysis::sentinel")]
    pub spectral_rolloff_hz: f64,
}

impl QualityMetrics {
    pub fn band_power_db(&self, band: Band) -> f64 {
        match band {
            Band::Low => self.low_band_power_db,
            Band::Mid => self.mid_band_power_db,
            Band::Bird => self.bird_band_power_db,
            Band::High => self.high_band_power_db,
        }
    }
}

/// Level in dB with the shared floor.
pub fn to_db(amplitude: f64) -> f64 {
    20.0 * (amplitude + DB_FLOOR).log10()
}

/// Derive all metrics from a frame and its spectrum.
pub fn compute_metrics(samples: &[f32], slice: &SpectralSlice) -> QualityMetrics {
    let (sum_sq, peak) = samples.iter().fold((0.0f64, 0.0f64), |(sq, pk), &s| {
        let s = s as f64;
        (sq + s * s, pk.max(s.abs()))
    });
    let rms = if samples.is_empty() {
        0.0
    } else {
        (sum_sq / samples.len() as f64).sqrt()
    };

    let crest_factor = peak / (rms + DB_FLOOR);

    let low = Band::Low.mean_power_db(slice);
    let mid = Band::Mid.mean_power_db(slice);
    let bird = Band::Bird.mean_power_db(slice);
    let high = Band::High.mean_power_db(slice);

    QualityMetrics {
        rms,
        rms_db: to_db(rms),
        peak,
        peak_db: to_db(peak),
        crest_factor,
        // No floor: silence gives -inf here.
        crest_factor_db: 20.0 * crest_factor.log10(),
        low_band_power_db: low,
        mid_band_power_db: mid,
        bird_band_power_db: bird,
        high_band_power_db: high,
        snr_bird_to_low_db: bird - low,
        snr_bird_to_mid_db: bird - mid,
        spectral_centroid_hz: spectral_centroid(slice),
        spectral_rolloff_hz: spectral_rolloff(slice),
    }
}

/// Centroid weighted by `power_db` itself. May be NaN or infinite for
/// degenerate spectra.
pub fn spectral_centroid(slice: &SpectralSlice) -> f64 {
    let weighted: f64 = slice
        .frequencies
        .iter()
        .zip(&slice.power_db)
        .map(|(f, p)| f * p)
        .sum();
    let total: f64 = slice.power_db.iter().sum();
    weighted / total
}

/// Lowest frequency whose cumulative `power_db` reaches 85% of the total.
/// Returns 0 when the spectrum is empty or no bin qualifies.
pub fn spectral_rolloff(slice: &SpectralSlice) -> f64 {
    let cumsum: Vec<f64> = slice
        .power_db
        .iter()
        .scan(0.0, |acc, &p| {
            *acc += p;
            Some(*acc)
        })
        .collect();

    let Some(&total) = cumsum.last() else {
        return 0.0;
    };
    let threshold = ROLLOFF_FRACTION * total;

    cumsum
        .iter()
        .position(|&c| c >= threshold)
        .and_then(|i| slice.frequencies.get(i).copied())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
