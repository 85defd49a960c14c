//! Plain-text reports printed by the binary.
//!
//! Every renderer returns a `String` so the caller decides where it goes
//! (stdout in the binary, assertions in tests).

use crate::analysis::{Distribution, FilterEffectiveness, QualityMetrics};
use crate::birdnet::{ConfidenceHistogram, CorrelationStats, CorrelationStrength, DetectionSummary};
use crate::pipeline::{AnalysisResult, StreamReport};

const WIDTH: usize = 80;

fn rule(ch: char) -> String {
    ch.to_string().repeat(WIDTH)
}

fn push_line(out: &mut String, line: impl AsRef<str>) {
    out.push_str(line.as_ref());
    out.push('\n');
}

fn push_banner(out: &mut String, title: &str) {
    push_line(out, "");
    push_line(out, rule('='));
    push_line(out, title);
    push_line(out, rule('='));
}

// ---------------------------------------------------------------------------
// Stream comparison
// ---------------------------------------------------------------------------

/// Per-stream levels, band powers and SNR distribution, followed by the
/// filter effectiveness of each consecutive stream pair.
pub fn render_comparison(result: &AnalysisResult) -> String {
    let mut out = String::new();
    push_banner(&mut out, "LYREBIRD AUDIO STREAM ANALYSIS RESULTS");

    for stream in &result.streams {
        render_stream(&mut out, stream);
    }

    push_line(&mut out, "");
    push_line(&mut out, rule('-'));
    push_line(&mut out, "FILTER EFFECTIVENESS:");
    push_line(&mut out, rule('-'));
    for fx in &result.effectiveness {
        render_effectiveness(&mut out, fx);
    }

    push_line(&mut out, "");
    push_line(&mut out, rule('='));
    out
}

fn render_stream(out: &mut String, stream: &StreamReport) {
    let name = stream.name.to_uppercase();
    let (Some(stats), Some(snr)) = (
        stream.history.latest_metrics(),
        stream.snr_distribution.as_ref(),
    ) else {
        push_line(out, "");
        push_line(out, format!("{name}: No data available"));
        return;
    };

    push_line(out, "");
    push_line(out, format!("{name} Stream ({} chunks):", stream.processed_frames));
    render_levels(out, stats);
    render_snr(out, snr);
}

fn render_levels(out: &mut String, m: &QualityMetrics) {
    push_line(out, format!("  RMS Level:           {:>7.1} dB", m.rms_db));
    push_line(out, format!("  Peak Level:          {:>7.1} dB", m.peak_db));
    push_line(out, format!("  Crest Factor:        {:>7.1} dB", m.crest_factor_db));
    push_line(out, format!("  Spectral Centroid:   {:>7.0} Hz", m.spectral_centroid_hz));
    push_line(out, format!("  Spectral Rolloff:    {:>7.0} Hz", m.spectral_rolloff_hz));
    push_line(out, "");
    push_line(out, "  Frequency Band Power:");
    push_line(out, format!("    Low Freq (<1kHz):    {:>7.1} dB", m.low_band_power_db));
    push_line(out, format!("    Mid Freq (1-3kHz):   {:>7.1} dB", m.mid_band_power_db));
    push_line(out, format!("    Bird Freq (3-8kHz):  {:>7.1} dB", m.bird_band_power_db));
    push_line(out, format!("    High Freq (>8kHz):   {:>7.1} dB", m.high_band_power_db));
}

fn render_snr(out: &mut String, d: &Distribution) {
    push_line(out, "");
    push_line(out, "  SNR Distribution (Bird/Low):");
    push_line(out, format!("    Median:              {:>7.1} dB", d.median));
    push_line(out, format!("    Mean:                {:>7.1} dB", d.mean));
    push_line(out, format!("    Std Dev:             {:>7.1} dB", d.std));
    push_line(out, format!("    25th percentile:     {:>7.1} dB", d.p25));
    push_line(out, format!("    75th percentile:     {:>7.1} dB", d.p75));
    push_line(out, format!("    Range:               {:>7.1} to {:.1} dB", d.min, d.max));
}

fn render_effectiveness(out: &mut String, fx: &FilterEffectiveness) {
    push_line(out, "");
    push_line(
        out,
        format!("  {} → {}:", fx.from.to_uppercase(), fx.to.to_uppercase()),
    );
    push_line(out, format!("    Low Freq Reduction:       {:>7.1} dB", fx.low_band_reduction_db));
    push_line(out, format!("    Bird Freq Change:         {:>+7.1} dB", fx.bird_band_change_db));
    push_line(
        out,
        format!("    Median SNR Improvement:   {:>+7.1} dB", fx.median_snr_improvement_db),
    );
}

// ---------------------------------------------------------------------------
// BirdNET detections
// ---------------------------------------------------------------------------

pub fn render_detection_summary(summary: &DetectionSummary) -> String {
    let mut out = String::new();
    push_banner(&mut out, "BIRDNET-GO DETECTION SUMMARY");

    push_line(&mut out, "");
    push_line(&mut out, format!("Total Detections: {}", summary.total_detections));
    push_line(&mut out, format!("Unique Species:   {}", summary.unique_species));

    if let Some(tr) = &summary.time_range {
        push_line(&mut out, "");
        push_line(&mut out, "Time Range:");
        push_line(&mut out, format!("  Start:    {}", tr.start.format("%Y-%m-%d %H:%M:%S")));
        push_line(&mut out, format!("  End:      {}", tr.end.format("%Y-%m-%d %H:%M:%S")));
        push_line(&mut out, format!("  Duration: {:.1} hours", tr.duration_hours));
    }

    if let Some(c) = &summary.confidence {
        push_line(&mut out, "");
        push_line(&mut out, "Confidence Statistics:");
        push_line(&mut out, format!("  Mean:     {:.3}", c.mean));
        push_line(&mut out, format!("  Median:   {:.3}", c.median));
        push_line(&mut out, format!("  Std Dev:  {:.3}", c.std));
        push_line(&mut out, format!("  Range:    {:.3} to {:.3}", c.min, c.max));
    }

    if !summary.top_species.is_empty() {
        push_line(&mut out, "");
        push_line(&mut out, format!("Top {} Detected Species:", summary.top_species.len()));
        for (i, (species, count)) in summary.top_species.iter().enumerate() {
            let pct = *count as f64 / summary.total_detections as f64 * 100.0;
            push_line(
                &mut out,
                format!("  {:2}. {species:35} {count:5} ({pct:5.1}%)", i + 1),
            );
        }
    }

    if !summary.hourly_distribution.is_empty() {
        push_line(&mut out, "");
        push_line(&mut out, "Detections by Hour:");
        for (hour, count) in &summary.hourly_distribution {
            let bar = "█".repeat(count / 10);
            push_line(&mut out, format!("  {hour:02}:00  {count:4}  {bar}"));
        }
    }

    push_line(&mut out, rule('='));
    out
}

pub fn render_confidence_histogram(hist: &ConfidenceHistogram) -> String {
    let mut out = String::new();
    push_banner(&mut out, "CONFIDENCE DISTRIBUTION");
    push_line(&mut out, "");
    push_line(&mut out, format!("Total detections with confidence: {}", hist.total));
    push_line(&mut out, "");

    for bin in &hist.bins {
        let pct = bin.count as f64 / hist.total as f64 * 100.0;
        let bar = "█".repeat(pct as usize);
        push_line(
            &mut out,
            format!(
                "  {:.1}-{:.1}  {:5} ({pct:5.1}%)  {bar}",
                bin.lower, bin.upper, bin.count
            ),
        );
    }

    push_line(&mut out, rule('='));
    out
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

pub fn render_correlation(stats: &CorrelationStats) -> String {
    let mut out = String::new();
    push_banner(&mut out, "DETECTION QUALITY CORRELATION ANALYSIS");

    push_line(&mut out, "");
    push_line(&mut out, format!("Total detections analyzed: {}", stats.total_samples));
    if let [lo, hi] = stats.snr_range[..] {
        push_line(&mut out, format!("SNR range: {lo:.1} to {hi:.1} dB"));
    }
    push_line(
        &mut out,
        format!("Correlation (SNR vs Confidence): {:.3}", stats.correlation),
    );

    let strength = stats.strength();
    let mark = match strength {
        CorrelationStrength::Weak => "⚠",
        _ => "✓",
    };
    push_line(&mut out, format!("  {mark} {}", strength.describe()));

    if !stats.confidence_by_snr.is_empty() {
        push_line(&mut out, "");
        push_line(&mut out, "Average Confidence by SNR:");
        for bin in &stats.confidence_by_snr {
            push_line(
                &mut out,
                format!(
                    "  {:>2.0}-{:<2.0} dB  {:.3}  (n={})",
                    bin.snr_from, bin.snr_to, bin.avg_confidence, bin.count
                ),
            );
        }
    }

    if !stats.species_stats.is_empty() {
        push_line(&mut out, "");
        push_line(&mut out, "Per-Species Quality:");
        for (species, s) in &stats.species_stats {
            push_line(
                &mut out,
                format!(
                    "  {species:35} SNR {:>6.1} ± {:<5.1} dB  conf {:.3}  (n={})",
                    s.avg_snr, s.snr_std, s.avg_confidence, s.count
                ),
            );
        }
    }

    push_line(&mut out, rule('='));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
