//! Backend module for talking to the acquisition board over BLE
//!
//! Everything that touches the radio lives here. The connection session runs
//! on its own thread; notifications are decoded on the provider's callback
//! context and handed to the consumer through the transfer channel.
//!
//! # Architecture
//!
//! - [`BleProvider`] - Seam between the pipeline and a BLE stack
//! - [`locator`] - Scans and picks the peripheral advertising the target name
//! - [`diagnostics`] - Walks services, characteristics and descriptors and logs them
//! - [`ConnectionSession`] - Connect, discover, subscribe, then watch the link
//! - [`transfer`] - Unbounded FIFO from the notification context to the consumer
//!
//! # Providers
//!
//! - [`SimulatedPeripheral`] - In-process peripheral for tests and `--simulate`
//! - `BtleProvider` - btleplug-backed adapter (requires the `ble` feature)
//!
//! # Example
//!
//! ```ignore
//! use biostream::backend::{transfer, ConnectionSession, SimulatedPeripheral};
//! use biostream::config::{AppConfig, ChannelBinding};
//! use biostream::lifecycle::StopSignal;
//!
//! let provider = SimulatedPeripheral::new()
//!     .with_acquisition_board("AA:BB", "ESP_SPP_SERVER", &ChannelBinding::defaults());
//! let (sender, mut receiver) = transfer::channel();
//!
//! let mut session = ConnectionSession::new(provider, Arc::new(AppConfig::default()), StopSignal::new());
//! std::thread::spawn(move || session.run(sender));
//!
//! while let Some(reading) = receiver.recv() {
//!     println!("{} {} {}", reading.kind, reading.elapsed_seconds, reading.raw_value);
//! }
//! ```

#[cfg(feature = "ble")]
pub mod btle;
pub mod diagnostics;
pub mod locator;
pub mod provider;
pub mod session;
pub mod simulated;
pub mod transfer;

#[cfg(feature = "ble")]
pub use btle::BtleProvider;
pub use diagnostics::GattReport;
pub use provider::{
    AdvertisedPeripheral, BleProvider, CharProperties, GattCharacteristic, GattService,
    NotificationCallback, PeripheralHandle, PeripheralId,
};
pub use session::{ConnectionSession, SessionOutcome, SessionReport};
pub use simulated::{SamplePattern, SignalGenerator, SimulatedPeripheral, SimulatorControl};
pub use transfer::{ChannelCloser, ReadingReceiver, ReadingSender};
