//! Multi-stream audio capture and spectral quality analysis.
//!
//! Captures several audio streams in parallel through external decoders,
//! analyses fixed-length frames for band power, SNR and spectral shape, and
//! compares how well each filtering stage isolates the 3–8 kHz bird band.
//! A thin BirdNET-Go client correlates detection confidence with the same
//! metrics computed over recorded clips.

pub mod analysis;
pub mod audio;
pub mod birdnet;
pub mod config;
pub mod pipeline;
pub mod report;
