//! Simulated BLE peripheral
//!
//! An in-process [`BleProvider`] that plays the acquisition board without a
//! radio. It drives the integration tests and the `--simulate` mode of the
//! binary.
//!
//! # Features
//!
//! - **Scripted advertisements**: any number of peripherals, named or not
//! - **Scripted GATT table**: services, characteristics, descriptors and
//!   readable values, with per-item read failures for diagnostics
//! - **Push notifications**: [`SimulatorControl::notify`] invokes the
//!   subscribed callback synchronously on the caller's thread
//! - **Link loss**: drop the link on demand or after N notifications
//! - **Pattern generation**: [`SignalGenerator`] produces 12-bit samples
//!
//! # Example
//!
//! ```ignore
//! use biostream::backend::SimulatedPeripheral;
//! use biostream::config::ChannelBinding;
//!
//! let sim = SimulatedPeripheral::new()
//!     .with_advertisement("11:22:33:44:55:66", Some("Headphones"))
//!     .with_acquisition_board("AA:BB:CC:DD:EE:FF", "ESP_SPP_SERVER", &ChannelBinding::defaults());
//! let control = sim.control();
//!
//! // ... hand `sim` to a pipeline, then:
//! control.wait_for_subscriptions(2, Duration::from_secs(1));
//! control.notify(HEART_SOUND_CHAR_UUID, &[0xff, 0x0f]);
//! ```

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::provider::{
    AdvertisedPeripheral, BleProvider, CharProperties, GattCharacteristic, GattService,
    NotificationCallback, PeripheralHandle,
};
use crate::config::ChannelBinding;
use crate::error::{BioStreamError, Result};

/// Primary service of the acquisition board
pub const ACQUISITION_SERVICE_UUID: Uuid =
    Uuid::from_u128(0xcdd4c6c4_7a3c_599b_324e_f93750d2f001);

/// Client Characteristic Configuration descriptor
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Largest sample a 12-bit ADC produces
const ADC_MAX: f64 = 4095.0;

// ==================== Sample Patterns ====================

/// Pattern for generating simulated ADC samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplePattern {
    /// Fixed sample
    Constant(u16),
    /// Sine wave in ADC counts
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Counter that wraps back to zero past `max`
    Counter { step: u16, max: u16 },
}

impl Default for SamplePattern {
    fn default() -> Self {
        SamplePattern::Sine {
            frequency: 1.0,
            amplitude: 1500.0,
            offset: 2048.0,
        }
    }
}

/// Generates 12-bit samples from a [`SamplePattern`]
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    pattern: SamplePattern,
    counter: u16,
}

impl SignalGenerator {
    /// Create a new generator
    pub fn new(pattern: SamplePattern) -> Self {
        Self {
            pattern,
            counter: 0,
        }
    }

    /// Next sample at `elapsed_secs`, clamped to 0..=4095
    pub fn next_sample(&mut self, elapsed_secs: f64) -> u16 {
        match self.pattern {
            SamplePattern::Constant(v) => v.min(ADC_MAX as u16),
            SamplePattern::Sine {
                frequency,
                amplitude,
                offset,
            } => {
                let v = offset
                    + amplitude * (2.0 * std::f64::consts::PI * frequency * elapsed_secs).sin();
                v.round().clamp(0.0, ADC_MAX) as u16
            }
            SamplePattern::Counter { step, max } => {
                let value = self.counter;
                let next = self.counter.saturating_add(step);
                self.counter = if next > max { 0 } else { next };
                value.min(ADC_MAX as u16)
            }
        }
    }

    /// Next sample encoded as a notification payload
    pub fn next_payload(&mut self, elapsed_secs: f64) -> Vec<u8> {
        self.next_sample(elapsed_secs).to_le_bytes().to_vec()
    }
}

// ==================== Shared State ====================

type SharedCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// State shared between the provider and its control handles
struct SimShared {
    link_up: AtomicBool,
    subscriptions: Mutex<HashMap<Uuid, SharedCallback>>,
    subscribe_tx: Sender<Uuid>,
    subscribe_rx: Receiver<Uuid>,
    disconnect_after: Mutex<Option<usize>>,
    delivered: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl SimShared {
    fn drop_link(&self) {
        self.link_up.store(false, Ordering::SeqCst);
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.clear();
        }
    }
}

// ==================== Simulated Peripheral ====================

/// In-process stand-in for a BLE stack with one connectable board
pub struct SimulatedPeripheral {
    advertisements: Vec<AdvertisedPeripheral>,
    services: Vec<GattService>,
    values: HashMap<Uuid, Vec<u8>>,
    failing_reads: HashSet<Uuid>,
    failing_descriptors: HashSet<Uuid>,
    refuse_connect: bool,
    scan_delay: Duration,
    shared: Arc<SimShared>,
}

impl Default for SimulatedPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPeripheral {
    /// Create an empty simulator: nothing advertises
    pub fn new() -> Self {
        let (subscribe_tx, subscribe_rx) = unbounded();
        Self {
            advertisements: Vec::new(),
            services: Vec::new(),
            values: HashMap::new(),
            failing_reads: HashSet::new(),
            failing_descriptors: HashSet::new(),
            refuse_connect: false,
            scan_delay: Duration::ZERO,
            shared: Arc::new(SimShared {
                link_up: AtomicBool::new(false),
                subscriptions: Mutex::new(HashMap::new()),
                subscribe_tx,
                subscribe_rx,
                disconnect_after: Mutex::new(None),
                delivered: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            }),
        }
    }

    /// Add an advertising peripheral
    pub fn with_advertisement(mut self, id: &str, name: Option<&str>) -> Self {
        self.advertisements.push(AdvertisedPeripheral::new(id, name));
        self
    }

    /// Add a service to the GATT table
    pub fn with_service(mut self, service: GattService) -> Self {
        self.services.push(service);
        self
    }

    /// Advertise `name` and expose one read/notify characteristic per binding
    pub fn with_acquisition_board(
        self,
        id: &str,
        name: &str,
        bindings: &[ChannelBinding],
    ) -> Self {
        let characteristics = bindings
            .iter()
            .map(|b| GattCharacteristic {
                uuid: b.characteristic,
                service: ACQUISITION_SERVICE_UUID,
                properties: CharProperties::read_notify(),
                descriptors: vec![CCCD_UUID],
            })
            .collect();

        let mut sim = self
            .with_advertisement(id, Some(name))
            .with_service(GattService {
                uuid: ACQUISITION_SERVICE_UUID,
                primary: true,
                characteristics,
            });
        for binding in bindings {
            sim.values.insert(binding.characteristic, vec![0, 0]);
        }
        sim
    }

    /// Set the value returned when `characteristic` is read
    pub fn with_value(mut self, characteristic: Uuid, value: Vec<u8>) -> Self {
        self.values.insert(characteristic, value);
        self
    }

    /// Make reads of `characteristic` fail
    pub fn with_failing_read(mut self, characteristic: Uuid) -> Self {
        self.failing_reads.insert(characteristic);
        self
    }

    /// Make descriptor reads under `characteristic` fail
    pub fn with_failing_descriptors(mut self, characteristic: Uuid) -> Self {
        self.failing_descriptors.insert(characteristic);
        self
    }

    /// Reject every connection attempt
    pub fn refuse_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Drop the link after `count` delivered notifications
    pub fn disconnect_after(self, count: usize) -> Self {
        if let Ok(mut limit) = self.shared.disconnect_after.lock() {
            *limit = Some(count);
        }
        self
    }

    /// Make each scan take `delay`
    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = delay;
        self
    }

    /// Handle for driving the simulator from another thread
    pub fn control(&self) -> SimulatorControl {
        SimulatorControl {
            shared: self.shared.clone(),
        }
    }

    fn find_characteristic(&self, uuid: Uuid) -> Option<&GattCharacteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
    }

    fn ensure_link(&self) -> Result<()> {
        if self.shared.link_up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BioStreamError::Disconnected)
        }
    }
}

impl BleProvider for SimulatedPeripheral {
    fn scan(&mut self, timeout: Duration) -> Result<Vec<AdvertisedPeripheral>> {
        if !self.scan_delay.is_zero() {
            std::thread::sleep(self.scan_delay.min(timeout));
        }
        Ok(self.advertisements.clone())
    }

    fn connect(
        &mut self,
        peripheral: &AdvertisedPeripheral,
        _timeout: Duration,
    ) -> Result<PeripheralHandle> {
        if self.refuse_connect {
            return Err(BioStreamError::Connection(format!(
                "{} refused the connection",
                peripheral.id
            )));
        }
        if !self.advertisements.iter().any(|a| a.id == peripheral.id) {
            return Err(BioStreamError::Connection(format!(
                "{} is not in range",
                peripheral.id
            )));
        }

        self.shared.link_up.store(true, Ordering::SeqCst);
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let name = peripheral.name.clone().unwrap_or_default();
        Ok(PeripheralHandle::new(peripheral.id.clone(), name))
    }

    fn enumerate(&mut self, _handle: &PeripheralHandle) -> Result<Vec<GattService>> {
        self.ensure_link()?;
        Ok(self.services.clone())
    }

    fn read_characteristic(
        &mut self,
        _handle: &PeripheralHandle,
        characteristic: Uuid,
    ) -> Result<Vec<u8>> {
        self.ensure_link()?;
        if self.failing_reads.contains(&characteristic) {
            return Err(BioStreamError::CharacteristicRead {
                uuid: characteristic,
                message: "read not permitted".to_string(),
            });
        }
        Ok(self.values.get(&characteristic).cloned().unwrap_or_default())
    }

    fn read_descriptor(
        &mut self,
        _handle: &PeripheralHandle,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Vec<u8>> {
        self.ensure_link()?;
        if self.failing_descriptors.contains(&characteristic) {
            return Err(BioStreamError::DescriptorRead {
                uuid: descriptor,
                message: "descriptor read failed".to_string(),
            });
        }

        let subscribed = self
            .shared
            .subscriptions
            .lock()
            .map(|subs| subs.contains_key(&characteristic))
            .unwrap_or(false);
        if descriptor == CCCD_UUID && subscribed {
            Ok(vec![0x01, 0x00])
        } else {
            Ok(vec![0x00, 0x00])
        }
    }

    fn subscribe(
        &mut self,
        _handle: &PeripheralHandle,
        characteristic: &GattCharacteristic,
        callback: NotificationCallback,
    ) -> Result<()> {
        self.ensure_link()?;
        let uuid = characteristic.uuid;
        match self.find_characteristic(uuid) {
            Some(c) if c.properties.notify || c.properties.indicate => {}
            Some(_) => {
                return Err(BioStreamError::Ble(format!(
                    "characteristic {} does not support notifications",
                    uuid
                )))
            }
            None => {
                return Err(BioStreamError::Ble(format!(
                    "characteristic {} not found",
                    uuid
                )))
            }
        }

        let callback: SharedCallback = Arc::from(callback);
        self.shared
            .subscriptions
            .lock()
            .map_err(|_| BioStreamError::Ble("subscription table poisoned".to_string()))?
            .insert(uuid, callback);
        let _ = self.shared.subscribe_tx.send(uuid);
        Ok(())
    }

    fn is_connected(&mut self, _handle: &PeripheralHandle) -> bool {
        self.shared.link_up.load(Ordering::SeqCst)
    }

    fn disconnect(&mut self, _handle: &PeripheralHandle) {
        self.shared.disconnects.fetch_add(1, Ordering::SeqCst);
        self.shared.drop_link();
    }
}

// ==================== Control Handle ====================

/// Drives a [`SimulatedPeripheral`] from outside the connection thread
#[derive(Clone)]
pub struct SimulatorControl {
    shared: Arc<SimShared>,
}

impl SimulatorControl {
    /// Push a notification on `characteristic`
    ///
    /// The subscribed callback runs on the calling thread before this
    /// returns. Returns `false` when the link is down or nobody subscribed.
    pub fn notify(&self, characteristic: Uuid, payload: &[u8]) -> bool {
        if !self.shared.link_up.load(Ordering::SeqCst) {
            return false;
        }

        let callback = match self.shared.subscriptions.lock() {
            Ok(subs) => subs.get(&characteristic).cloned(),
            Err(_) => None,
        };
        let Some(callback) = callback else {
            return false;
        };

        callback(payload);

        let delivered = self.shared.delivered.fetch_add(1, Ordering::SeqCst) + 1;
        let limit = self
            .shared
            .disconnect_after
            .lock()
            .ok()
            .and_then(|limit| *limit);
        if limit.is_some_and(|limit| delivered >= limit) {
            tracing::debug!("Simulated link dropped after {} notifications", delivered);
            self.shared.drop_link();
        }
        true
    }

    /// Drop the link as if the peripheral went out of range
    pub fn drop_link(&self) {
        self.shared.drop_link();
    }

    /// Whether the simulated link is up
    pub fn is_link_up(&self) -> bool {
        self.shared.link_up.load(Ordering::SeqCst)
    }

    /// Block until `count` subscriptions have been registered
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_for_subscriptions(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut seen = 0;
        while seen < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.shared.subscribe_rx.recv_timeout(remaining) {
                Ok(_) => seen += 1,
                Err(_) => return false,
            }
        }
        true
    }

    /// Characteristics that currently hold a subscription
    pub fn subscribed(&self) -> Vec<Uuid> {
        self.shared
            .subscriptions
            .lock()
            .map(|subs| subs.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Notifications delivered to a callback so far
    pub fn delivered(&self) -> usize {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    /// Successful connect calls so far
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Disconnect calls so far
    pub fn disconnect_count(&self) -> usize {
        self.shared.disconnects.load(Ordering::SeqCst)
    }

    /// Feed generated samples until the link goes down
    ///
    /// Waits up to `subscribe_timeout` for one subscription per stream, then
    /// pushes one sample per stream every `period`. The thread returns the
    /// number of notifications it delivered.
    pub fn spawn_feeder(
        &self,
        streams: Vec<(Uuid, SignalGenerator)>,
        period: Duration,
        subscribe_timeout: Duration,
    ) -> JoinHandle<usize> {
        let control = self.clone();
        std::thread::spawn(move || {
            let mut streams = streams;
            if !control.wait_for_subscriptions(streams.len(), subscribe_timeout) {
                tracing::warn!("Simulated feeder gave up waiting for subscriptions");
                return 0;
            }

            let start = Instant::now();
            let mut sent = 0;
            while control.is_link_up() {
                let elapsed = start.elapsed().as_secs_f64();
                for (characteristic, generator) in streams.iter_mut() {
                    if control.notify(*characteristic, &generator.next_payload(elapsed)) {
                        sent += 1;
                    }
                }
                std::thread::sleep(period);
            }
            tracing::debug!("Simulated feeder stopped after {} notifications", sent);
            sent
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BLOOD_PRESSURE_CHAR_UUID, HEART_SOUND_CHAR_UUID};

    fn board() -> SimulatedPeripheral {
        SimulatedPeripheral::new().with_acquisition_board(
            "AA:BB:CC:DD:EE:FF",
            "ESP_SPP_SERVER",
            &ChannelBinding::defaults(),
        )
    }

    fn connect(sim: &mut SimulatedPeripheral) -> PeripheralHandle {
        let found = sim.scan(Duration::from_millis(10)).unwrap();
        sim.connect(&found[0], Duration::from_secs(1)).unwrap()
    }

    fn characteristic(uuid: Uuid) -> GattCharacteristic {
        GattCharacteristic {
            uuid,
            service: ACQUISITION_SERVICE_UUID,
            properties: CharProperties::read_notify(),
            descriptors: vec![CCCD_UUID],
        }
    }

    #[test]
    fn test_counter_pattern_wraps() {
        let mut gen = SignalGenerator::new(SamplePattern::Counter { step: 2, max: 4 });
        let samples: Vec<u16> = (0..5).map(|_| gen.next_sample(0.0)).collect();
        assert_eq!(samples, vec![0, 2, 4, 0, 2]);
    }

    #[test]
    fn test_sine_pattern_stays_in_adc_range() {
        let mut gen = SignalGenerator::new(SamplePattern::Sine {
            frequency: 1.0,
            amplitude: 5000.0,
            offset: 2048.0,
        });
        for i in 0..100 {
            let sample = gen.next_sample(i as f64 * 0.01);
            assert!(sample <= 4095);
        }
    }

    #[test]
    fn test_constant_payload_is_little_endian() {
        let mut gen = SignalGenerator::new(SamplePattern::Constant(0x0abc));
        assert_eq!(gen.next_payload(0.0), vec![0xbc, 0x0a]);
    }

    #[test]
    fn test_notify_reaches_subscribed_callback() {
        let mut sim = board();
        let control = sim.control();
        let handle = connect(&mut sim);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        sim.subscribe(
            &handle,
            &characteristic(HEART_SOUND_CHAR_UUID),
            Box::new(move |payload| sink.lock().unwrap().push(payload.to_vec())),
        )
        .unwrap();

        assert!(control.wait_for_subscriptions(1, Duration::from_millis(100)));
        assert!(control.notify(HEART_SOUND_CHAR_UUID, &[1, 2]));
        assert!(!control.notify(BLOOD_PRESSURE_CHAR_UUID, &[3]));
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[test]
    fn test_disconnect_after_limit() {
        let mut sim = board().disconnect_after(2);
        let control = sim.control();
        let handle = connect(&mut sim);
        sim.subscribe(&handle, &characteristic(HEART_SOUND_CHAR_UUID), Box::new(|_| {}))
            .unwrap();

        assert!(control.notify(HEART_SOUND_CHAR_UUID, &[1]));
        assert!(control.notify(HEART_SOUND_CHAR_UUID, &[2]));
        assert!(!control.is_link_up());
        assert!(!control.notify(HEART_SOUND_CHAR_UUID, &[3]));
        assert!(!sim.is_connected(&handle));
    }

    #[test]
    fn test_refused_connection() {
        let mut sim = board().refuse_connect();
        let found = sim.scan(Duration::from_millis(10)).unwrap();
        let result = sim.connect(&found[0], Duration::from_secs(1));
        assert!(matches!(result, Err(BioStreamError::Connection(_))));
    }

    #[test]
    fn test_failing_reads() {
        let mut sim = board()
            .with_failing_read(HEART_SOUND_CHAR_UUID)
            .with_failing_descriptors(BLOOD_PRESSURE_CHAR_UUID);
        let handle = connect(&mut sim);

        assert!(sim
            .read_characteristic(&handle, HEART_SOUND_CHAR_UUID)
            .is_err());
        assert_eq!(
            sim.read_characteristic(&handle, BLOOD_PRESSURE_CHAR_UUID)
                .unwrap(),
            vec![0, 0]
        );
        assert!(sim
            .read_descriptor(&handle, BLOOD_PRESSURE_CHAR_UUID, CCCD_UUID)
            .is_err());
    }

    #[test]
    fn test_subscribe_unknown_characteristic() {
        let mut sim = board();
        let handle = connect(&mut sim);
        let result = sim.subscribe(&handle, &characteristic(Uuid::nil()), Box::new(|_| {}));
        assert!(result.is_err());
    }
}
