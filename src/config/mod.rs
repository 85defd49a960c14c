//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for analysis
//! timing, decoder launch and the BirdNET-Go API, `AppPaths` for the
//! platform config directory, and TOML persistence via `AppConfig::load` /
//! `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    default_streams, parse_stream_spec, AnalysisConfig, AppConfig, BirdnetConfig, ConfigError,
    DecoderConfig, StreamConfig,
};
