//! # biostream: BLE biosignal streaming pipeline
//!
//! Connects to an acquisition board advertising over Bluetooth Low Energy,
//! subscribes to its heart-sound and blood-pressure characteristics, and
//! turns every notification into a timestamped reading. Readings feed a
//! bounded window for live display and an append-only CSV file per signal.
//!
//! ## Architecture
//!
//! - **Backend**: BLE provider seam, device locator and connection session
//! - **Decoder**: Little-endian payload to raw value, scaled to volts
//! - **Transfer**: Crossbeam channel from the notification context to the consumer
//! - **Store**: Sliding window buffers and persistence sinks
//! - **Lifecycle**: Threads, stop signal, Ctrl-C handling and ordered shutdown
//!
//! ## Configuration
//!
//! The pipeline reads a TOML file from `--config`, `BIOSTREAM_CONFIG` or the
//! platform data directory under `dev.biostream`:
//!
//! - **Linux**: `~/.local/share/dev.biostream/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.biostream/config.toml`
//! - **Windows**: `%APPDATA%\dev.biostream\config.toml`
//!
//! ## Example
//!
//! ```ignore
//! use biostream::{
//!     backend::SimulatedPeripheral,
//!     config::{AppConfig, ChannelBinding},
//!     lifecycle::{interrupt, Pipeline},
//!     SignalKind,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load_or_default(AppConfig::resolve_path(None).as_deref());
//!     let provider = SimulatedPeripheral::new().with_acquisition_board(
//!         "SIM:00",
//!         &config.device.target_name,
//!         &config.channels,
//!     );
//!
//!     let pipeline = Pipeline::new(config, provider)?;
//!     interrupt::install(pipeline.stop_signal())?;
//!
//!     let handle = pipeline.spawn()?;
//!     let recent = handle.snapshot(SignalKind::HeartSound);
//!     let report = handle.join()?;
//!     println!("{} readings", report.readings_received);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod decoder;
pub mod error;
pub mod lifecycle;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use backend::{BleProvider, ConnectionSession, SimulatedPeripheral};
pub use config::AppConfig;
pub use error::{BioStreamError, Result};
pub use lifecycle::{Pipeline, PipelineHandle, PipelineReport, StopReason, StopSignal};
pub use store::{WindowSample, WindowStore};
pub use types::{Reading, SignalKind};
