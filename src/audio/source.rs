//! Decode sources: the external processes that turn a stream URL into raw
//! PCM bytes.
//!
//! [`DecodeSource`] is the seam between a capture worker and whatever
//! produces its bytes. [`FfmpegSource`] is the production implementation: an
//! `ffmpeg` child process writing `s16le` mono to its stdout. The URL is
//! handed to the decoder untouched.
//!
//! [`MockSource`] and [`MockSourceFactory`] (available under `#[cfg(test)]`)
//! script byte sequences, dead streams and hung reads without spawning any
//! process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

use crate::config::{DecoderConfig, StreamConfig};

/// How long `terminate` waits for a killed decoder to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Errors raised while opening or reading a decode source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The decoder process could not be started.
    #[error("failed to start decoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The decoder started but its stdout pipe was not captured.
    #[error("decoder stdout was not captured")]
    NoStdout,

    /// Reading from the decoder failed.
    #[error("decoder read failed: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An opaque byte producer owned by exactly one capture worker.
#[async_trait]
pub trait DecodeSource: Send {
    /// Read up to `max` bytes. Blocks until `max` bytes are available or the
    /// stream ends; an empty vector means end of stream.
    async fn read(&mut self, max: usize) -> Result<Vec<u8>, SourceError>;

    /// Stop the source and release its resources.
    ///
    /// Must be idempotent and safe to call after the source already exited.
    async fn terminate(&mut self);
}

/// Opens one [`DecodeSource`] per configured stream.
pub trait SourceFactory: Send + Sync {
    fn open(&self, stream: &StreamConfig) -> Result<Box<dyn DecodeSource>, SourceError>;
}

// ---------------------------------------------------------------------------
// FfmpegLauncher
// ---------------------------------------------------------------------------

/// Spawns `ffmpeg` decoders that emit mono `s16le` at a fixed sample rate.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    decoder: DecoderConfig,
    sample_rate: u32,
}

impl FfmpegLauncher {
    pub fn new(decoder: DecoderConfig, sample_rate: u32) -> Self {
        Self {
            decoder,
            sample_rate,
        }
    }

    /// Command-line arguments for decoding `url`.
    pub fn build_args(&self, url: &str) -> Vec<String> {
        let rate = self.sample_rate.to_string();
        let mut args = vec!["-loglevel".to_string(), self.decoder.loglevel.clone()];
        if let Some(transport) = self
            .decoder
            .rtsp_transport
            .as_deref()
            .filter(|t| !t.is_empty())
        {
            args.push("-rtsp_transport".into());
            args.push(transport.to_string());
        }
        args.extend(
            [
                "-i",
                url,
                "-f",
                "s16le",
                "-acodec",
                "pcm_s16le",
                "-ar",
                rate.as_str(),
                "-ac",
                "1",
                "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

impl SourceFactory for FfmpegLauncher {
    fn open(&self, stream: &StreamConfig) -> Result<Box<dyn DecodeSource>, SourceError> {
        let args = self.build_args(&stream.url);
        let source = FfmpegSource::spawn(&self.decoder.program, &args, &stream.name)?;
        Ok(Box::new(source))
    }
}

// ---------------------------------------------------------------------------
// FfmpegSource
// ---------------------------------------------------------------------------

/// A running decoder process. Dropping it kills the child.
pub struct FfmpegSource {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegSource {
    /// Start `program` with `args`, capturing stdout for PCM and forwarding
    /// stderr lines to the log under `stream_name`.
    pub fn spawn(program: &str, args: &[String], stream_name: &str) -> Result<Self, SourceError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(SourceError::NoStdout)?;

        if let Some(stderr) = child.stderr.take() {
            let name = stream_name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::warn!("decoder[{name}]: {line}");
                }
            });
        }

        log::debug!("decoder[{stream_name}]: spawned {program} {}", args.join(" "));

        Ok(Self {
            child: Some(child),
            stdout: Some(stdout),
        })
    }
}

#[async_trait]
impl DecodeSource for FfmpegSource {
    async fn read(&mut self, max: usize) -> Result<Vec<u8>, SourceError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(Vec::new());
        };

        let mut buf = vec![0u8; max];
        let mut filled = 0;
        while filled < max {
            let n = stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    async fn terminate(&mut self) {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return;
        };

        // Already exited (or kill not supported): nothing to do beyond reaping.
        let _ = child.start_kill();
        match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => log::debug!("decoder exited with {status}"),
            Ok(Err(e)) => log::warn!("failed to reap decoder: {e}"),
            Err(_) => log::warn!("decoder did not exit within {REAP_TIMEOUT:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockSource  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockSource, MockSourceFactory};

#[cfg(test)]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{DecodeSource, SourceError, SourceFactory};
    use crate::config::StreamConfig;

    /// What a mock does once its scripted reads are used up.
    #[derive(Debug, Clone)]
    enum Tail {
        /// Report end of stream.
        Eof,
        /// Return the same chunk forever.
        Repeat(Vec<u8>),
        /// Never complete the read.
        Hang,
        /// Fail every read.
        Fail,
    }

    /// A scripted [`DecodeSource`] that never spawns a process.
    #[derive(Debug)]
    pub struct MockSource {
        script: VecDeque<Vec<u8>>,
        tail: Tail,
        delay: Duration,
        terminations: Arc<AtomicUsize>,
    }

    impl MockSource {
        fn with_tail(script: Vec<Vec<u8>>, tail: Tail) -> Self {
            Self {
                script: script.into(),
                tail,
                delay: Duration::ZERO,
                terminations: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Return each chunk once, then end of stream.
        pub fn scripted(chunks: Vec<Vec<u8>>) -> Self {
            Self::with_tail(chunks, Tail::Eof)
        }

        /// Return `chunk` on every read, pausing `delay` before each one.
        pub fn endless(chunk: Vec<u8>, delay: Duration) -> Self {
            Self::with_tail(Vec::new(), Tail::Repeat(chunk)).delayed(delay)
        }

        /// End of stream on the very first read.
        pub fn dead() -> Self {
            Self::with_tail(Vec::new(), Tail::Eof)
        }

        /// A read that never returns.
        pub fn hanging() -> Self {
            Self::with_tail(Vec::new(), Tail::Hang)
        }

        /// Every read fails with an I/O error.
        pub fn failing() -> Self {
            Self::with_tail(Vec::new(), Tail::Fail)
        }

        /// Pause `delay` before each read.
        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Shared counter of `terminate` calls, readable after the source
        /// has been moved into a worker.
        pub fn terminations(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.terminations)
        }
    }

    #[async_trait]
    impl DecodeSource for MockSource {
        async fn read(&mut self, max: usize) -> Result<Vec<u8>, SourceError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(mut chunk) = self.script.pop_front() {
                chunk.truncate(max);
                return Ok(chunk);
            }
            match &self.tail {
                Tail::Eof => Ok(Vec::new()),
                Tail::Repeat(chunk) => Ok(chunk[..chunk.len().min(max)].to_vec()),
                Tail::Hang => std::future::pending().await,
                Tail::Fail => Err(SourceError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock read failure",
                ))),
            }
        }

        async fn terminate(&mut self) {
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands out pre-built [`MockSource`]s by stream name. A stream with no
    /// registered source fails to open.
    #[derive(Default)]
    pub struct MockSourceFactory {
        sources: Mutex<HashMap<String, MockSource>>,
    }

    impl MockSourceFactory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(self, name: &str, source: MockSource) -> Self {
            self.sources
                .lock()
                .unwrap()
                .insert(name.to_string(), source);
            self
        }
    }

    impl SourceFactory for MockSourceFactory {
        fn open(&self, stream: &StreamConfig) -> Result<Box<dyn DecodeSource>, SourceError> {
            self.sources
                .lock()
                .unwrap()
                .remove(&stream.name)
                .map(|s| Box::new(s) as Box<dyn DecodeSource>)
                .ok_or_else(|| SourceError::Spawn {
                    program: "mock".into(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no mock source for {}", stream.name),
                    ),
                })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn launcher(transport: Option<&str>) -> FfmpegLauncher {
        FfmpegLauncher::new(
            DecoderConfig {
                program: "ffmpeg".into(),
                rtsp_transport: transport.map(str::to_string),
                loglevel: "error".into(),
            },
            48_000,
        )
    }

    #[test]
    fn ffmpeg_args_request_mono_s16le() {
        let args = launcher(Some("tcp")).build_args("rtsp://host:8554/raw");
        assert_eq!(
            args,
            [
                "-loglevel", "error", "-rtsp_transport", "tcp", "-i",
                "rtsp://host:8554/raw", "-f", "s16le", "-acodec", "pcm_s16le",
                "-ar", "48000", "-ac", "1", "pipe:1",
            ]
        );
    }

    #[test]
    fn ffmpeg_args_without_transport() {
        let args = launcher(None).build_args("/tmp/a.wav");
        assert!(!args.iter().any(|a| a == "-rtsp_transport"));
        assert_eq!(args[2], "-i");
        assert_eq!(args[3], "/tmp/a.wav");
    }

    #[tokio::test]
    async fn missing_decoder_binary_is_spawn_error() {
        let result = FfmpegSource::spawn(
            "/nonexistent/definitely-not-ffmpeg",
            &["-version".to_string()],
            "raw",
        );
        assert!(matches!(result, Err(SourceError::Spawn { .. })));
    }

    #[tokio::test]
    async fn mock_scripted_then_eof() {
        let mut src = MockSource::scripted(vec![vec![1, 2, 3, 4], vec![5, 6]]);
        assert_eq!(src.read(2).await.unwrap(), vec![1, 2]);
        assert_eq!(src.read(8).await.unwrap(), vec![5, 6]);
        assert!(src.read(8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mock_terminate_is_counted() {
        let mut src = MockSource::dead();
        let count = src.terminations();
        src.terminate().await;
        src.terminate().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn mock_factory_hands_out_each_source_once() {
        let factory = MockSourceFactory::new().with("raw", MockSource::dead());
        let stream = StreamConfig::new("raw", "mock://raw");
        assert!(factory.open(&stream).is_ok());
        assert!(factory.open(&stream).is_err());
    }
}
