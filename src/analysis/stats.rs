//! Summary statistics over a metric time series.

use serde::{Deserialize, Serialize};

/// Median, mean, spread and range of a series.
///
/// Percentiles interpolate linearly between closest ranks and the standard
/// deviation is the population form. A NaN anywhere in the input makes every
/// statistic NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: usize,
    #[serde(with = "crate::analysis::sentinel")]
    pub median: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub mean: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub std: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub p25: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub p75: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub min: f64,
    #[serde(with = "crate::analysis::sentinel")]
    pub max: f64,
}

impl Distribution {
    /// `None` for an empty series.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();

        if values.iter().any(|v| v.is_nan()) {
            return Some(Self {
                count,
                median: f64::NAN,
                mean: f64::NAN,
                std: f64::NAN,
                p25: f64::NAN,
                p75: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            });
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            count,
            median: percentile_sorted(&sorted, 50.0),
            mean,
            std: variance.sqrt(),
            p25: percentile_sorted(&sorted, 25.0),
            p75: percentile_sorted(&sorted, 75.0),
            min: sorted[0],
            max: sorted[count - 1],
        })
    }
}

/// Linear-interpolated percentile (`q` in 0..=100) of ascending `sorted`.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;

    if lo == hi || sorted[lo] == sorted[hi] {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Median of an unsorted series, `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    Distribution::from_values(values).map(|d| d.median)
}
