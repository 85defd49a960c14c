//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to the
//! coordinator and its capture workers.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration value that cannot drive an analysis run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no streams configured")]
    NoStreams,

    #[error("stream name must not be empty")]
    EmptyStreamName,

    #[error("duplicate stream name: {0}")]
    DuplicateStream(String),

    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,

    #[error("chunk duration {0}s yields an empty frame at the configured sample rate")]
    EmptyFrame(f64),

    #[error("buffer capacity must be greater than zero")]
    ZeroBufferCapacity,

    #[error("invalid stream specification {0:?} (expected name=url)")]
    InvalidStreamSpec(String),
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Timing and sizing parameters of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Decoder output sample rate in Hz.
    pub sample_rate: u32,
    /// Length of one analysis window in seconds.
    pub chunk_duration_secs: f64,
    /// Frames held per stream before the oldest is evicted.
    pub buffer_capacity: usize,
    /// Run length in seconds, warm-up included.
    pub duration_secs: u64,
    /// Delay between starting the workers and the first drain attempt.
    pub warmup_ms: u64,
    /// Longest the coordinator waits when every buffer is empty.
    pub poll_timeout_ms: u64,
    /// Interval between progress log lines.
    pub progress_interval_secs: u64,
    /// Per-worker join timeout during shutdown.
    pub join_timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            chunk_duration_secs: 1.0,
            buffer_capacity: 10,
            duration_secs: 10,
            warmup_ms: 2_000,
            poll_timeout_ms: 500,
            progress_interval_secs: 5,
            join_timeout_ms: 2_000,
        }
    }
}

impl AnalysisConfig {
    /// Samples per frame: `floor(sample_rate × chunk_duration_secs)`.
    pub fn frame_len(&self) -> usize {
        let len = self.sample_rate as f64 * self.chunk_duration_secs;
        if len.is_finite() && len > 0.0 {
            len as usize
        } else {
            0
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// One named capture source. The URL is handed to the decoder untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub url: String,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// The three captures of the reference deployment, in comparison order.
pub fn default_streams() -> Vec<StreamConfig> {
    vec![
        StreamConfig::new("raw", "rtsp://localhost:8554/rode_ai_micro_right_raw"),
        StreamConfig::new("filtered", "rtsp://localhost:8554/rode_ai_micro_right_filt"),
        StreamConfig::new("bird", "rtsp://localhost:8554/rode_ai_micro_right_bird"),
    ]
}

/// Parse a `name=url` override. Only the first `=` separates the two parts,
/// so URLs containing `=` survive intact.
///
/// ```
/// use lyrebird_analyzer::config::parse_stream_spec;
///
/// let s = parse_stream_spec("raw=rtsp://host/raw?x=1").unwrap();
/// assert_eq!(s.name, "raw");
/// assert_eq!(s.url, "rtsp://host/raw?x=1");
/// assert!(parse_stream_spec("no-separator").is_err());
/// ```
pub fn parse_stream_spec(spec: &str) -> Result<StreamConfig, ConfigError> {
    match spec.split_once('=') {
        Some((name, url)) if !name.trim().is_empty() => {
            Ok(StreamConfig::new(name.trim(), url.trim()))
        }
        _ => Err(ConfigError::InvalidStreamSpec(spec.to_string())),
    }
}

// ---------------------------------------------------------------------------
// DecoderConfig
// ---------------------------------------------------------------------------

/// How the external decode process is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Executable name or path.
    pub program: String,
    /// Value for `-rtsp_transport`; `None` omits the flag (non-RTSP inputs).
    pub rtsp_transport: Option<String>,
    /// Value for `-loglevel`.
    pub loglevel: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            rtsp_transport: Some("tcp".into()),
            loglevel: "error".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// BirdnetConfig
// ---------------------------------------------------------------------------

/// Connection settings for the BirdNET-Go REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BirdnetConfig {
    /// Base URL of the BirdNET-Go server (no trailing slash needed).
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Detections requested per page when paging through results.
    pub page_size: usize,
    /// Upper bound on detections fetched by a paged query.
    pub max_detections: usize,
}

impl Default for BirdnetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            timeout_secs: 10,
            page_size: 1_000,
            max_detections: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use lyrebird_analyzer::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run timing and buffer sizing.
    pub analysis: AnalysisConfig,
    /// Decoder launch settings.
    pub decoder: DecoderConfig,
    /// BirdNET-Go API settings.
    pub birdnet: BirdnetConfig,
    /// Streams in comparison order.
    pub streams: Vec<StreamConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            decoder: DecoderConfig::default(),
            birdnet: BirdnetConfig::default(),
            streams: default_streams(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace the configured streams with command-line overrides.
    /// An empty list leaves the configuration untouched.
    pub fn apply_stream_overrides(&mut self, specs: &[String]) -> Result<(), ConfigError> {
        if specs.is_empty() {
            return Ok(());
        }
        self.streams = specs
            .iter()
            .map(|s| parse_stream_spec(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    /// Check that the configuration can drive an analysis run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streams.is_empty() {
            return Err(ConfigError::NoStreams);
        }

        let mut seen = HashSet::new();
        for stream in &self.streams {
            if stream.name.trim().is_empty() {
                return Err(ConfigError::EmptyStreamName);
            }
            if !seen.insert(stream.name.as_str()) {
                return Err(ConfigError::DuplicateStream(stream.name.clone()));
            }
        }

        if self.analysis.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.analysis.frame_len() == 0 {
            return Err(ConfigError::EmptyFrame(self.analysis.chunk_duration_secs));
        }
        if self.analysis.buffer_capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
