//! Command-line entry point.
//!
//! # Commands
//!
//! - `analyze`: capture every configured stream for a fixed duration, print
//!   the comparison report, optionally export JSON.
//! - `detections`: fetch and summarise BirdNET-Go detections.
//! - `correlate`: relate detection confidence to the quality of the clips
//!   that produced them.
//! - `config show | init`: print or write the settings file.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`, default `info`).
//! 2. Parse arguments and load [`AppConfig`].
//! 3. Create the [`tokio`] runtime and run the chosen command on it.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local};
use clap::{Args, Parser, Subcommand};

use lyrebird_analyzer::{
    audio::FfmpegLauncher,
    birdnet::{analyze_detection_clips, correlate, BirdnetClient, DetectionQuery, DetectionSet},
    config::{AppConfig, AppPaths},
    pipeline::{lock_status, Coordinator, RunPhase, SharedStatus},
    report::{
        correlation_document, export_document, render_comparison, render_confidence_histogram,
        render_correlation, render_detection_summary, write_json,
    },
};

const BANNER_WIDTH: usize = 80;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(
    name = "lyrebird-analyzer",
    version,
    about = "Compare audio streams for bird detection and inspect BirdNET-Go results"
)]
struct Cli {
    /// Settings file (default: the platform config directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture and analyse the configured streams.
    Analyze(AnalyzeArgs),
    /// Fetch and summarise BirdNET-Go detections.
    Detections(DetectionsArgs),
    /// Correlate clip audio quality with detection confidence.
    Correlate(CorrelateArgs),
    /// Show or initialise the settings file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Run length in seconds.
    #[arg(short, long)]
    duration: Option<u64>,

    /// Stream as `name=url`; repeat for several. Replaces the configured list.
    #[arg(short, long = "stream", value_name = "NAME=URL")]
    streams: Vec<String>,

    /// Export results to this JSON file.
    #[arg(short, long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Do not print the comparison report.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Args)]
struct DetectionsArgs {
    /// BirdNET-Go server URL.
    #[arg(long)]
    url: Option<String>,

    /// Fetch detections from the last N hours.
    #[arg(long, default_value_t = 24)]
    hours: u32,

    /// Maximum detections to fetch.
    #[arg(long)]
    max: Option<usize>,

    #[arg(long)]
    species: Option<String>,

    /// Minimum confidence (0.0-1.0).
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Start date (YYYY-MM-DD); overrides --hours.
    #[arg(long)]
    date_from: Option<String>,

    /// End date (YYYY-MM-DD).
    #[arg(long)]
    date_to: Option<String>,

    /// Export recent detections to this JSON file.
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,

    /// Also print the species known to the server.
    #[arg(long)]
    list_species: bool,
}

#[derive(Debug, Args)]
struct CorrelateArgs {
    /// BirdNET-Go server URL.
    #[arg(long)]
    url: String,

    /// Directory containing the detection clips.
    #[arg(long, value_name = "DIR")]
    clips: PathBuf,

    /// Analyse detections from the last N hours.
    #[arg(long, default_value_t = 1)]
    hours: u32,

    /// Export results to this JSON file.
    #[arg(short, long, value_name = "PATH")]
    json: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Write the default configuration.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn banner(title: &str) {
    println!("{}", "=".repeat(BANNER_WIDTH));
    println!("{title}");
    println!("{}", "=".repeat(BANNER_WIDTH));
}

fn settings_path(cli_path: Option<&Path>) -> PathBuf {
    cli_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppPaths::new().settings_file)
}

fn load_config(cli_path: Option<&Path>) -> Result<AppConfig> {
    match cli_path {
        Some(path) => AppConfig::load_from(path),
        None => Ok(AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        })),
    }
}

fn birdnet_client(config: &AppConfig, url: Option<&str>) -> BirdnetClient {
    let mut birdnet = config.birdnet.clone();
    if let Some(url) = url {
        birdnet.base_url = url.to_string();
    }
    BirdnetClient::from_config(&birdnet)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run_analyze(mut config: AppConfig, args: AnalyzeArgs) -> Result<()> {
    config.apply_stream_overrides(&args.streams)?;
    if let Some(secs) = args.duration {
        config.analysis.duration_secs = secs;
    }
    let duration_secs = config.analysis.duration_secs;
    let progress_interval = config.analysis.progress_interval();

    let launcher = FfmpegLauncher::new(config.decoder.clone(), config.analysis.sample_rate);
    let coordinator = Coordinator::new(config, Arc::new(launcher))?;

    println!();
    println!("Analyzing streams for {duration_secs} seconds...");
    println!("Press Ctrl+C to stop early");
    println!();

    let stop = coordinator.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted; stopping");
            stop.store(false, Ordering::SeqCst);
        }
    });

    if !args.quiet {
        tokio::spawn(print_progress(coordinator.status(), progress_interval));
    }

    let result = coordinator.run().await;

    if !args.quiet {
        print!("{}", render_comparison(&result));
    }
    if let Some(path) = &args.json {
        write_json(&export_document(&result), path)?;
        println!();
        println!("Results exported to: {}", path.display());
    }
    Ok(())
}

/// Print a progress line every `interval` while the run is in progress.
async fn print_progress(status: SharedStatus, interval: std::time::Duration) {
    let interval = interval.max(std::time::Duration::from_millis(100));
    loop {
        tokio::time::sleep(interval).await;
        let line = {
            let st = lock_status(&status);
            if st.phase != RunPhase::Running {
                break;
            }
            let per_stream: Vec<String> =
                st.frames.iter().map(|(name, n)| format!("{name} {n}")).collect();
            format!(
                "{:.0}s / {:.0}s: {} chunks ({})",
                st.elapsed_secs,
                st.duration_secs,
                st.total_frames(),
                per_stream.join(", ")
            )
        };
        println!("{line}");
    }
}

async fn run_detections(config: AppConfig, args: DetectionsArgs) -> Result<()> {
    let client = birdnet_client(&config, args.url.as_deref());

    banner(&format!("BirdNET-Go Detection Analyzer v{}", env!("CARGO_PKG_VERSION")));
    println!();
    println!("Connecting to BirdNET-Go at {}...", client.base_url());
    if !client.test_connection().await {
        bail!(
            "could not connect to BirdNET-Go; verify the server is running at {}",
            client.base_url()
        );
    }
    println!("✓ Connected successfully");
    println!();

    if args.list_species {
        let species = client.get_species_list().await?;
        println!("Species known to server: {}", species.len());
        for entry in &species {
            println!("  {entry}");
        }
        println!();
    }

    let date_from = args.date_from.clone().unwrap_or_else(|| {
        (Local::now() - Duration::hours(i64::from(args.hours)))
            .format("%Y-%m-%d")
            .to_string()
    });
    let query = DetectionQuery {
        species: args.species.clone(),
        min_confidence: args.min_confidence,
        date_from: Some(date_from),
        date_to: args.date_to.clone(),
        ..DetectionQuery::default()
    };
    let max = args.max.unwrap_or(config.birdnet.max_detections);

    println!("Fetching detections from {}...", client.base_url());
    let detections = client.get_all_detections(&query, max).await?;
    println!("Total detections fetched: {}", detections.len());

    let set = DetectionSet::from(detections);
    let Some(summary) = set.summary() else {
        println!();
        println!("No detections found matching criteria");
        return Ok(());
    };

    print!("{}", render_detection_summary(&summary));
    if let Some(hist) = set.confidence_histogram() {
        print!("{}", render_confidence_histogram(&hist));
    } else {
        println!("No confidence data available");
    }

    if let Some(path) = &args.export {
        let export = set.export_for_audio_analysis(args.hours, Local::now());
        write_json(&export, path)?;
        println!();
        println!(
            "Exported {} detections to: {}",
            export.metadata.total_detections,
            path.display()
        );
    }
    Ok(())
}

async fn run_correlate(config: AppConfig, args: CorrelateArgs) -> Result<()> {
    let client = birdnet_client(&config, Some(args.url.as_str()));

    banner(&format!("LyreBird Detection Quality Correlator v{}", env!("CARGO_PKG_VERSION")));
    println!();
    println!("Fetching detections from last {} hour(s)...", args.hours);

    let detections = client
        .recent_detections(args.hours)
        .await
        .context("fetching detections")?;
    if detections.is_empty() {
        bail!("no detections found");
    }
    println!("Found {} detections", detections.len());

    println!();
    println!("Analyzing audio clips from {}...", args.clips.display());
    let clips_dir = args.clips.clone();
    let clips = tokio::task::spawn_blocking(move || analyze_detection_clips(&detections, &clips_dir))
        .await
        .context("clip analysis task failed")?;
    if clips.is_empty() {
        bail!(
            "no audio clips could be analyzed; check that clips exist in {}",
            args.clips.display()
        );
    }
    println!("Successfully analyzed {} clips", clips.len());

    let Some(stats) = correlate(&clips) else {
        bail!("could not compute correlations");
    };
    print!("{}", render_correlation(&stats));

    if let Some(path) = &args.json {
        write_json(&correlation_document(&stats, &clips, args.hours, &args.clips), path)?;
        println!();
        println!("Results exported to: {}", path.display());
    }
    Ok(())
}

fn run_config(config: &AppConfig, command: ConfigCommand, path: &Path) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            AppConfig::default().save_to(path)?;
            println!("Wrote default settings to {}", path.display());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Arguments + configuration
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // 3. Tokio runtime (one capture task per stream plus the coordinator)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match cli.command {
        Command::Analyze(args) => rt.block_on(run_analyze(config, args)),
        Command::Detections(args) => rt.block_on(run_detections(config, args)),
        Command::Correlate(args) => rt.block_on(run_correlate(config, args)),
        Command::Config(command) => {
            run_config(&config, command, &settings_path(cli.config.as_deref()))
        }
    }
}
