//! Per-stream time series of analysed frames, and cross-stream comparisons.
//!
//! A [`StreamHistory`] is written only by the coordinator while a run is
//! active and is read-only afterwards.

use serde::Serialize;

use super::quality::QualityMetrics;
use super::spectrum::SpectralSlice;
use super::stats::{median, Distribution};

// ---------------------------------------------------------------------------
// StreamHistory
// ---------------------------------------------------------------------------

/// One analysed frame in a stream's series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: f64,
    pub metrics: QualityMetrics,
}

/// Append-only record of every analysed frame of one stream, plus the most
/// recent spectrum.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamHistory {
    pub latest_slice: Option<SpectralSlice>,
    pub series: Vec<SeriesPoint>,
}

impl StreamHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one analysed frame. A timestamp earlier than the previous
    /// entry is clamped so the series stays non-decreasing.
    pub fn record(&mut self, timestamp: f64, slice: SpectralSlice, metrics: QualityMetrics) {
        let timestamp = match self.series.last() {
            Some(last) if timestamp < last.timestamp => last.timestamp,
            _ => timestamp,
        };
        self.series.push(SeriesPoint { timestamp, metrics });
        self.latest_slice = Some(slice);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn latest_metrics(&self) -> Option<&QualityMetrics> {
        self.series.last().map(|p| &p.metrics)
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.series.iter().map(|p| p.timestamp).collect()
    }

    /// Bird-to-low SNR of every frame, in order.
    pub fn snr_series(&self) -> Vec<f64> {
        self.series.iter().map(|p| p.metrics.snr_bird_to_low_db).collect()
    }

    pub fn bird_power_series(&self) -> Vec<f64> {
        self.series.iter().map(|p| p.metrics.bird_band_power_db).collect()
    }

    pub fn low_power_series(&self) -> Vec<f64> {
        self.series.iter().map(|p| p.metrics.low_band_power_db).collect()
    }

    pub fn snr_distribution(&self) -> Option<Distribution> {
        Distribution::from_values(&self.snr_series())
    }
}

// ---------------------------------------------------------------------------
// FilterEffectiveness
// ---------------------------------------------------------------------------

/// How the latest metrics changed from one stream to the next in
/// configuration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterEffectiveness {
    pub from: String,
    pub to: String,
    /// `from.low − to.low`: positive means the next stream has less rumble.
    #[serde(with = "crate::analysis::sentinel")]
    pub low_band_reduction_db: f64,
    /// `to.bird − from.bird`.
    #[serde(with = "crate::analysis::sentinel")]
    pub bird_band_change_db: f64,
    /// `median(to.snr) − median(from.snr)`.
    #[serde(with = "crate::analysis::sentinel")]
    pub median_snr_improvement_db: f64,
}

impl FilterEffectiveness {
    /// `None` when either stream has no analysed frame.
    pub fn between(
        from: &str,
        from_history: &StreamHistory,
        to: &str,
        to_history: &StreamHistory,
    ) -> Option<Self> {
        let curr = from_history.latest_metrics()?;
        let next = to_history.latest_metrics()?;
        let curr_median = median(&from_history.snr_series())?;
        let next_median = median(&to_history.snr_series())?;

        Some(Self {
            from: from.to_string(),
            to: to.to_string(),
            low_band_reduction_db: curr.low_band_power_db - next.low_band_power_db,
            bird_band_change_db: next.bird_band_power_db - curr.bird_band_power_db,
            median_snr_improvement_db: next_median - curr_median,
        })
    }
}

/// Pairwise effectiveness for each consecutive pair of `(name, history)`.
pub fn filter_effectiveness<'a, I>(streams: I) -> Vec<FilterEffectiveness>
where
    I: IntoIterator<Item = (&'a str, &'a StreamHistory)>,
{
    let streams: Vec<_> = streams.into_iter().collect();
    streams
        .windows(2)
        .filter_map(|pair| {
            let (from, from_h) = pair[0];
            let (to, to_h) = pair[1];
            FilterEffectiveness::between(from, from_h, to, to_h)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(low: f64, bird: f64) -> QualityMetrics {
        QualityMetrics {
            rms: 0.1,
            rms_db: -20.0,
            peak: 0.5,
            peak_db: -6.0,
            crest_factor: 5.0,
            crest_factor_db: 14.0,
            low_band_power_db: low,
            mid_band_power_db: -60.0,
            bird_band_power_db: bird,
            high_band_power_db: -80.0,
            snr_bird_to_low_db: bird - low,
            snr_bird_to_mid_db: bird + 60.0,
            spectral_centroid_hz: 4_000.0,
            spectral_rolloff_hz: 9_000.0,
        }
    }

    fn history(points: &[(f64, f64, f64)]) -> StreamHistory {
        let mut h = StreamHistory::new();
        for &(t, low, bird) in points {
            h.record(t, SpectralSlice::default(), metrics(low, bird));
        }
        h
    }

    #[test]
    fn record_keeps_order_and_latest() {
        let h = history(&[(1.0, -40.0, -50.0), (2.0, -42.0, -45.0)]);
        assert_eq!(h.len(), 2);
        assert_eq!(h.timestamps(), vec![1.0, 2.0]);
        assert_eq!(h.latest_metrics().unwrap().bird_band_power_db, -45.0);
        assert_eq!(h.snr_series(), vec![-10.0, -3.0]);
        assert_eq!(h.bird_power_series(), vec![-50.0, -45.0]);
        assert_eq!(h.low_power_series(), vec![-40.0, -42.0]);
        assert!(h.latest_slice.is_some());
    }

    #[test]
    fn backwards_timestamp_is_clamped() {
        let h = history(&[(5.0, 0.0, 0.0), (4.0, 0.0, 0.0), (6.0, 0.0, 0.0)]);
        assert_eq!(h.timestamps(), vec![5.0, 5.0, 6.0]);
    }

    #[test]
    fn empty_history_has_no_distribution() {
        let h = StreamHistory::new();
        assert!(h.is_empty());
        assert!(h.snr_distribution().is_none());
        assert!(h.latest_metrics().is_none());
    }

    #[test]
    fn effectiveness_between_consecutive_streams() {
        let raw = history(&[(1.0, -30.0, -50.0), (2.0, -30.0, -50.0)]);
        let filtered = history(&[(1.0, -45.0, -48.0), (2.0, -45.0, -48.0)]);
        let bird = history(&[(1.0, -60.0, -47.0)]);

        let result = filter_effectiveness([
            ("raw", &raw),
            ("filtered", &filtered),
            ("bird", &bird),
        ]);
        assert_eq!(result.len(), 2);

        let first = &result[0];
        assert_eq!((first.from.as_str(), first.to.as_str()), ("raw", "filtered"));
        assert_eq!(first.low_band_reduction_db, 15.0);
        assert_eq!(first.bird_band_change_db, 2.0);
        // median snr: raw -20, filtered -3
        assert_eq!(first.median_snr_improvement_db, 17.0);

        assert_eq!(result[1].low_band_reduction_db, 15.0);
        assert_eq!(result[1].median_snr_improvement_db, 16.0);
    }

    #[test]
    fn pairs_with_an_empty_stream_are_skipped() {
        let raw = history(&[(1.0, -30.0, -50.0)]);
        let dead = StreamHistory::new();
        let bird = history(&[(1.0, -60.0, -47.0)]);

        let result = filter_effectiveness([("raw", &raw), ("dead", &dead), ("bird", &bird)]);
        assert!(result.is_empty());
    }
}
