//! BirdNET-Go detection records and the analytics run over them.
//!
//! Records come straight from `GET /api/detections` (camelCase JSON). Every
//! field is optional because servers differ in what they include; unknown
//! fields are ignored.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::analysis::Distribution;

/// Name used when a detection carries no common name.
pub const UNKNOWN_SPECIES: &str = "Unknown";

/// Number of species listed in a summary.
pub const TOP_SPECIES: usize = 15;

/// Confidence histogram edges: ten bins of width 0.1 over `[0, 1]`.
const HISTOGRAM_EDGES: [f64; 11] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A detection timestamp as sent by the server: ISO-8601 text or UNIX
/// seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectionTime {
    Unix(f64),
    Text(String),
}

/// One detection record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub common_name: Option<String>,
    pub scientific_name: Option<String>,
    pub confidence: Option<f64>,
    pub timestamp: Option<DetectionTime>,
    pub begin_time: Option<String>,
    pub end_time: Option<String>,
    pub clip_name: Option<String>,
}

impl Detection {
    /// Common name, or `"Unknown"`.
    pub fn species(&self) -> &str {
        self.common_name.as_deref().unwrap_or(UNKNOWN_SPECIES)
    }

    /// Confidence, treating a missing value as `0.0`.
    pub fn confidence_or_zero(&self) -> f64 {
        self.confidence.unwrap_or(0.0)
    }

    /// When the detection happened, in local time.
    ///
    /// Uses `timestamp` when present, otherwise `beginTime`. Returns `None`
    /// when neither parses.
    pub fn datetime(&self) -> Option<DateTime<Local>> {
        match &self.timestamp {
            Some(DetectionTime::Unix(secs)) => from_unix(*secs),
            Some(DetectionTime::Text(text)) => parse_iso(text),
            None => self.begin_time.as_deref().and_then(parse_iso),
        }
    }
}

fn from_unix(secs: f64) -> Option<DateTime<Local>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos).map(|utc| utc.with_timezone(&Local))
}

/// Parse an ISO-8601 timestamp. Text with an offset (or `Z`) is converted to
/// local time; text without one is taken as local wall-clock time.
pub fn parse_iso(text: &str) -> Option<DateTime<Local>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Local));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Local.from_local_datetime(&naive).earliest()
}

// ---------------------------------------------------------------------------
// Summary types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub total_detections: usize,
    pub unique_species: usize,
    /// Over detections that carry a confidence.
    pub confidence: Option<Distribution>,
    pub time_range: Option<TimeRange>,
    /// Most frequent species, highest count first; ties keep first-seen order.
    pub top_species: Vec<(String, usize)>,
    /// Detections per local hour of day.
    pub hourly_distribution: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceHistogram {
    /// Detections that carry a confidence (including any outside `[0, 1]`).
    pub total: usize,
    pub bins: Vec<HistogramBin>,
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub exported: String,
    pub total_detections: usize,
    pub time_window_hours: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedDetection {
    pub timestamp: Option<String>,
    pub species: String,
    pub scientific_name: String,
    pub confidence: f64,
    pub begin_time: Option<String>,
    pub end_time: Option<String>,
    pub clip_name: String,
}

/// Recent detections in the shape consumed by stream-analysis tooling.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionExport {
    pub metadata: ExportMetadata,
    pub detections: Vec<ExportedDetection>,
}

// ---------------------------------------------------------------------------
// DetectionSet
// ---------------------------------------------------------------------------

/// A batch of detections fetched for one analysis.
#[derive(Debug, Clone, Default)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl From<Vec<Detection>> for DetectionSet {
    fn from(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl DetectionSet {
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    /// `None` for an empty set.
    pub fn summary(&self) -> Option<DetectionSummary> {
        if self.detections.is_empty() {
            return None;
        }

        // Species counts in first-seen order.
        let mut order: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for d in &self.detections {
            match index.get(d.species()) {
                Some(&i) => order[i].1 += 1,
                None => {
                    index.insert(d.species(), order.len());
                    order.push((d.species().to_string(), 1));
                }
            }
        }
        let unique_species = order.len();
        // Stable sort keeps first-seen order among equal counts.
        order.sort_by(|a, b| b.1.cmp(&a.1));
        order.truncate(TOP_SPECIES);

        let confidences: Vec<f64> = self.detections.iter().filter_map(|d| d.confidence).collect();

        let times: Vec<DateTime<Local>> = self.detections.iter().filter_map(Detection::datetime).collect();
        let time_range = match (times.iter().min(), times.iter().max()) {
            (Some(&start), Some(&end)) => Some(TimeRange {
                start,
                end,
                duration_hours: (end - start).num_milliseconds() as f64 / 3_600_000.0,
            }),
            _ => None,
        };

        let mut hourly_distribution = BTreeMap::new();
        for t in &times {
            *hourly_distribution.entry(t.hour()).or_insert(0) += 1;
        }

        Some(DetectionSummary {
            total_detections: self.detections.len(),
            unique_species,
            confidence: Distribution::from_values(&confidences),
            time_range,
            top_species: order,
            hourly_distribution,
        })
    }

    /// Confidence counts in ten 0.1-wide bins; the last bin includes 1.0.
    /// `None` when no detection carries a confidence.
    pub fn confidence_histogram(&self) -> Option<ConfidenceHistogram> {
        let confidences: Vec<f64> = self.detections.iter().filter_map(|d| d.confidence).collect();
        if confidences.is_empty() {
            return None;
        }

        let mut counts = [0usize; HISTOGRAM_EDGES.len() - 1];
        for &c in &confidences {
            if let Some(bin) = histogram_bin(c) {
                counts[bin] += 1;
            }
        }

        let bins = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| HistogramBin {
                lower: HISTOGRAM_EDGES[i],
                upper: HISTOGRAM_EDGES[i + 1],
                count,
            })
            .collect();

        Some(ConfidenceHistogram {
            total: confidences.len(),
            bins,
        })
    }

    /// Detections strictly newer than `now − hours`.
    pub fn recent(&self, hours: u32, now: DateTime<Local>) -> Vec<&Detection> {
        let cutoff = now - Duration::hours(i64::from(hours));
        self.detections
            .iter()
            .filter(|d| d.datetime().is_some_and(|t| t > cutoff))
            .collect()
    }

    /// Case-insensitive match on the common name.
    pub fn by_species(&self, species: &str) -> Vec<&Detection> {
        let wanted = species.to_lowercase();
        self.detections
            .iter()
            .filter(|d| d.common_name.as_deref().unwrap_or("").to_lowercase() == wanted)
            .collect()
    }

    /// Detections with `min ≤ confidence ≤ max` (missing confidence is 0).
    pub fn by_confidence(&self, min: f64, max: f64) -> Vec<&Detection> {
        self.detections
            .iter()
            .filter(|d| (min..=max).contains(&d.confidence_or_zero()))
            .collect()
    }

    /// Detections from the last `hours`, flattened for export.
    pub fn export_for_audio_analysis(&self, hours: u32, now: DateTime<Local>) -> DetectionExport {
        let detections: Vec<ExportedDetection> = self
            .recent(hours, now)
            .into_iter()
            .map(|d| ExportedDetection {
                timestamp: d.datetime().map(|t| t.to_rfc3339()),
                species: d.species().to_string(),
                scientific_name: d.scientific_name.clone().unwrap_or_default(),
                confidence: d.confidence_or_zero(),
                begin_time: d.begin_time.clone(),
                end_time: d.end_time.clone(),
                clip_name: d.clip_name.clone().unwrap_or_default(),
            })
            .collect();

        DetectionExport {
            metadata: ExportMetadata {
                exported: now.to_rfc3339(),
                total_detections: detections.len(),
                time_window_hours: hours,
            },
            detections,
        }
    }
}

fn histogram_bin(value: f64) -> Option<usize> {
    let last = HISTOGRAM_EDGES.len() - 2;
    if !(HISTOGRAM_EDGES[0]..=HISTOGRAM_EDGES[last + 1]).contains(&value) {
        return None;
    }
    // Largest edge not above the value; 1.0 folds into the last bin.
    let bin = HISTOGRAM_EDGES
        .iter()
        .rposition(|&edge| edge <= value)
        .unwrap_or(0);
    Some(bin.min(last))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn det(name: &str, confidence: f64, when: &str) -> Detection {
        Detection {
            common_name: Some(name.to_string()),
            confidence: Some(confidence),
            timestamp: Some(DetectionTime::Text(when.to_string())),
            clip_name: Some(format!("{name}.wav")),
            ..Detection::default()
        }
    }

    fn local(text: &str) -> DateTime<Local> {
        parse_iso(text).unwrap()
    }

    #[test]
    fn deserialises_camel_case_and_ignores_extra_fields() {
        let json = r#"[{
            "commonName": "American Robin",
            "scientificName": "Turdus migratorius",
            "confidence": 0.87,
            "timestamp": "2024-05-01T06:15:00",
            "clipName": "robin.wav",
            "id": 42
        }, {
            "commonName": "Blue Jay",
            "timestamp": 1714544100
        }]"#;
        let list: Vec<Detection> = serde_json::from_str(json).unwrap();

        assert_eq!(list[0].species(), "American Robin");
        assert_eq!(list[0].confidence, Some(0.87));
        assert_eq!(list[0].clip_name.as_deref(), Some("robin.wav"));
        assert_eq!(list[1].timestamp, Some(DetectionTime::Unix(1_714_544_100.0)));
        assert!(list[1].datetime().is_some());
        assert_eq!(list[1].confidence_or_zero(), 0.0);
    }

    #[test]
    fn datetime_parsing_variants() {
        let naive = local("2024-05-01T06:15:00");
        assert_eq!(naive.hour(), 6);
        assert!(parse_iso("2024-05-01 06:15:00.250").is_some());
        assert!(parse_iso("2024-05-01T06:15:00Z").is_some());
        assert!(parse_iso("2024-05-01").is_some());
        assert!(parse_iso("yesterday").is_none());

        let fallback = Detection {
            begin_time: Some("2024-05-01T07:00:00".into()),
            ..Detection::default()
        };
        assert_eq!(fallback.datetime().map(|t| t.hour()), Some(7));
        assert!(Detection::default().datetime().is_none());
    }

    #[test]
    fn summary_counts_species_and_hours() {
        let set = DetectionSet::from(vec![
            det("Robin", 0.9, "2024-05-01T06:10:00"),
            det("Wren", 0.5, "2024-05-01T06:40:00"),
            det("Robin", 0.7, "2024-05-01T08:00:00"),
            Detection::default(),
        ]);
        let s = set.summary().unwrap();

        assert_eq!(s.total_detections, 4);
        assert_eq!(s.unique_species, 3);
        assert_eq!(
            s.top_species,
            vec![
                ("Robin".to_string(), 2),
                ("Wren".to_string(), 1),
                (UNKNOWN_SPECIES.to_string(), 1),
            ]
        );

        let c = s.confidence.unwrap();
        assert_eq!(c.count, 3);
        assert_eq!(c.median, 0.7);
        assert_eq!(c.min, 0.5);
        assert_eq!(c.max, 0.9);

        let range = s.time_range.unwrap();
        assert!((range.duration_hours - 110.0 / 60.0).abs() < 1e-9);
        assert_eq!(s.hourly_distribution.get(&6), Some(&2));
        assert_eq!(s.hourly_distribution.get(&8), Some(&1));
    }

    #[test]
    fn empty_set_has_no_summary() {
        assert!(DetectionSet::default().summary().is_none());
        assert!(DetectionSet::default().confidence_histogram().is_none());
    }

    #[test]
    fn top_species_is_capped() {
        let list = (0..20)
            .map(|i| det(&format!("Species {i}"), 0.5, "2024-05-01T06:00:00"))
            .collect::<Vec<_>>();
        let s = DetectionSet::from(list).summary().unwrap();
        assert_eq!(s.unique_species, 20);
        assert_eq!(s.top_species.len(), TOP_SPECIES);
        assert_eq!(s.top_species[0].0, "Species 0");
    }

    #[test]
    fn histogram_bins_edges() {
        let list = [0.0, 0.05, 0.1, 0.3, 0.95, 1.0, 1.5]
            .iter()
            .map(|&c| det("x", c, "2024-05-01T06:00:00"))
            .collect::<Vec<_>>();
        let h = DetectionSet::from(list).confidence_histogram().unwrap();

        assert_eq!(h.total, 7);
        assert_eq!(h.bins.len(), 10);
        assert_eq!(h.bins[0].count, 2); // 0.0, 0.05
        assert_eq!(h.bins[1].count, 1); // 0.1
        assert_eq!(h.bins[3].count, 1); // 0.3
        assert_eq!(h.bins[9].count, 2); // 0.95, 1.0 (right edge included)
        // 1.5 is outside every bin
        assert_eq!(h.bins.iter().map(|b| b.count).sum::<usize>(), 6);
    }

    #[test]
    fn filters() {
        let set = DetectionSet::from(vec![
            det("American Robin", 0.9, "2024-05-01T06:00:00"),
            det("Wren", 0.4, "2024-05-01T12:00:00"),
            Detection::default(),
        ]);

        assert_eq!(set.by_species("american robin").len(), 1);
        assert_eq!(set.by_species("AMERICAN ROBIN").len(), 1);
        assert!(set.by_species("Owl").is_empty());

        assert_eq!(set.by_confidence(0.4, 0.9).len(), 2);
        // missing confidence counts as 0
        assert_eq!(set.by_confidence(0.0, 0.1).len(), 1);

        let now = local("2024-05-01T13:00:00");
        let recent = set.recent(2, now);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].species(), "Wren");
    }

    #[test]
    fn export_keeps_only_recent() {
        let set = DetectionSet::from(vec![
            det("Robin", 0.9, "2024-05-01T06:00:00"),
            det("Wren", 0.4, "2024-05-01T12:30:00"),
        ]);
        let export = set.export_for_audio_analysis(1, local("2024-05-01T13:00:00"));

        assert_eq!(export.metadata.total_detections, 1);
        assert_eq!(export.metadata.time_window_hours, 1);
        assert_eq!(export.detections[0].species, "Wren");
        assert_eq!(export.detections[0].clip_name, "Wren.wav");
        assert_eq!(export.detections[0].scientific_name, "");
        assert!(export.detections[0].timestamp.is_some());
    }
}
