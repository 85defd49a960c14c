//! Windowed power spectrum of one frame.
//!
//! A symmetric Hann window is applied, the frame goes through a real FFT and
//! each bin's squared magnitude is converted to decibels with a `1e-10`
//! floor so silent bins stay finite.

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use serde::Serialize;

/// Additive floor applied before every logarithm.
pub const DB_FLOOR: f64 = 1e-10;

// ---------------------------------------------------------------------------
// SpectralSlice
// ---------------------------------------------------------------------------

/// Frequency axis and matching power spectrum in dB.
///
/// Both vectors have `frame_len / 2 + 1` entries; frequencies ascend from
/// 0 Hz.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpectralSlice {
    pub frequencies: Vec<f64>,
    pub power_db: Vec<f64>,
}

impl SpectralSlice {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

/// Symmetric Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (n - 1) as f64;
            (0..n)
                .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / denom).cos())
                .collect()
        }
    }
}

/// Real-FFT bin centre frequencies for an `n`-point transform.
pub fn bin_frequencies(n: usize, sample_rate: u32) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let step = sample_rate as f64 / n as f64;
    (0..=n / 2).map(|k| k as f64 * step).collect()
}

// ---------------------------------------------------------------------------
// SpectralAnalyzer
// ---------------------------------------------------------------------------

struct Plan {
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    frequencies: Vec<f64>,
}

impl Plan {
    fn new(planner: &mut RealFftPlanner<f64>, n: usize, sample_rate: u32) -> Self {
        Self {
            fft: planner.plan_fft_forward(n),
            window: hann_window(n),
            frequencies: bin_frequencies(n, sample_rate),
        }
    }
}

/// Computes [`SpectralSlice`]s at a fixed sample rate.
///
/// The plan for the run's frame length is built once; any other length
/// (clip analysis) is planned on demand. `analyze` takes `&self` and has no
/// side effects, so one analyzer can serve every stream.
pub struct SpectralAnalyzer {
    sample_rate: u32,
    cached: Option<Plan>,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32, frame_len: usize) -> Self {
        let cached = (frame_len > 0)
            .then(|| Plan::new(&mut RealFftPlanner::new(), frame_len, sample_rate));
        Self {
            sample_rate,
            cached,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Power spectrum of `samples`. Empty input gives an empty slice.
    pub fn analyze(&self, samples: &[f32]) -> SpectralSlice {
        let n = samples.len();
        if n == 0 {
            return SpectralSlice::default();
        }

        match &self.cached {
            Some(plan) if plan.window.len() == n => run_plan(plan, samples),
            _ => {
                let plan = Plan::new(&mut RealFftPlanner::new(), n, self.sample_rate);
                run_plan(&plan, samples)
            }
        }
    }
}

fn run_plan(plan: &Plan, samples: &[f32]) -> SpectralSlice {
    let mut input: Vec<f64> = samples
        .iter()
        .zip(&plan.window)
        .map(|(&s, &w)| s as f64 * w)
        .collect();
    let mut spectrum = plan.fft.make_output_vec();

    if let Err(e) = plan.fft.process(&mut input, &mut spectrum) {
        log::error!("FFT of {} samples failed: {e}", samples.len());
        return SpectralSlice::default();
    }

    let power_db = spectrum
        .iter()
        .map(|c| 10.0 * (c.norm_sqr() + DB_FLOOR).log10())
        .collect();

    SpectralSlice {
        frequencies: plan.frequencies.clone(),
        power_db,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
