//! biostream - Main Entry Point
//!
//! Streams heart-sound and blood-pressure samples from a BLE acquisition
//! board into live windows and per-signal CSV files until Ctrl-C or until
//! the board goes away.

use std::path::PathBuf;
use std::sync::PoisonError;
use std::time::Duration;

use anyhow::Context;
use biostream::backend::{BleProvider, SamplePattern, SignalGenerator, SimulatedPeripheral};
use biostream::config::{AppConfig, LoggingConfig};
use biostream::lifecycle::{interrupt, Pipeline, PipelineHandle, StopReason};
use biostream::SignalKind;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often the text renderer prints the window state
const RENDER_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(
    name = "biostream",
    version,
    about = "Stream heart-sound and blood-pressure samples from a BLE acquisition board"
)]
struct Cli {
    /// Configuration file (defaults to $BIOSTREAM_CONFIG or the app data dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Advertised name of the peripheral to connect to
    #[arg(long)]
    target: Option<String>,

    /// Directory for the CSV files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Scan duration in seconds
    #[arg(long)]
    scan_timeout: Option<u64>,

    /// Run against a simulated peripheral instead of the radio
    #[arg(long)]
    simulate: bool,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,

    /// Save the active configuration (including overrides) before streaming
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(target) = &self.target {
            config.device.target_name = target.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.persistence.output_dir = dir.clone();
        }
        if let Some(secs) = self.scan_timeout {
            config.device.scan_timeout_secs = secs;
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,biostream=debug"));

    let Some(dir) = &logging.log_dir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "biostream.log"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Ok(Some(guard))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = AppConfig::resolve_path(cli.config.as_deref());

    if cli.write_default_config {
        let path = config_path.context("No config path available on this platform")?;
        AppConfig::default().save(&path)?;
        println!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(config_path.as_deref());
    cli.apply_overrides(&mut config);

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = init_logging(&config.logging)?;
    tracing::info!("Starting biostream");
    if let Some(path) = &config_path {
        tracing::debug!("Config path: {:?}", path);
    }

    config.validate()?;
    if cli.save_config {
        if let Some(path) = &config_path {
            config.save(path)?;
            tracing::info!("Configuration saved to {:?}", path);
        }
    }

    if cli.simulate {
        let provider = simulated_board(&config);
        return run(config, provider);
    }
    run_hardware(config)
}

#[cfg(feature = "ble")]
fn run_hardware(config: AppConfig) -> anyhow::Result<()> {
    let provider = biostream::backend::BtleProvider::new()
        .context("Failed to initialise the Bluetooth adapter")?;
    run(config, provider)
}

#[cfg(not(feature = "ble"))]
fn run_hardware(_config: AppConfig) -> anyhow::Result<()> {
    anyhow::bail!("built without the `ble` feature; rebuild with --features ble or pass --simulate")
}

/// Demo board advertising the configured name, fed by sine and counter patterns
fn simulated_board(config: &AppConfig) -> SimulatedPeripheral {
    let board = SimulatedPeripheral::new().with_acquisition_board(
        "SIM:00:00:00:00:01",
        &config.device.target_name,
        &config.channels,
    );

    let streams = config
        .channels
        .iter()
        .map(|binding| {
            let pattern = match binding.kind {
                SignalKind::HeartSound => SamplePattern::default(),
                SignalKind::BloodPressure => SamplePattern::Counter { step: 16, max: 4095 },
            };
            (binding.characteristic, SignalGenerator::new(pattern))
        })
        .collect();

    // The feeder exits on its own once the session releases the link
    let _feeder = board
        .control()
        .spawn_feeder(streams, Duration::from_millis(10), Duration::from_secs(30));
    board
}

fn run<P: BleProvider + 'static>(config: AppConfig, provider: P) -> anyhow::Result<()> {
    let output_dir = config.persistence.output_dir.clone();
    let timestamp_format = config.persistence.file_timestamp_format.clone();
    let write_summary = config.persistence.write_summary;

    let pipeline = Pipeline::new(config, provider)?;
    interrupt::install(pipeline.stop_signal()).context("Failed to install Ctrl-C handler")?;

    let handle = pipeline.spawn()?;
    render_until_stopped(&handle);

    let report = handle.join()?;
    for signal in &report.signals {
        tracing::info!(
            "{}: {} received, {} written, {} dropped",
            signal.kind.tag(),
            signal.received,
            signal.rows_written,
            signal.dropped
        );
    }

    if write_summary && report.session.streamed {
        report.write_summary(&output_dir, &timestamp_format)?;
    }

    if report.stop_reason == Some(StopReason::PeripheralLost) {
        tracing::warn!("Peripheral was lost; files hold everything received before the drop");
    }
    Ok(())
}

/// Text stand-in for a plot: latest value and window fill per kind
fn render_until_stopped(handle: &PipelineHandle) {
    let stop = handle.stop_signal();
    let windows = handle.windows();

    while !stop.wait_timeout(RENDER_INTERVAL) && !handle.is_finished() {
        let store = windows.read().unwrap_or_else(PoisonError::into_inner);
        for kind in SignalKind::ALL {
            let buffer = store.buffer(kind);
            match buffer.latest() {
                Some(sample) => tracing::info!(
                    "{} {:>8.3}s {:.3} V [{}/{}]",
                    kind.tag(),
                    sample.elapsed_seconds,
                    sample.value,
                    buffer.len(),
                    buffer.capacity()
                ),
                None => tracing::debug!("{} waiting for data", kind.tag()),
            }
        }
    }
}
