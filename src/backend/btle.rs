//! btleplug-backed BLE provider
//!
//! Wraps the async btleplug API behind the blocking [`BleProvider`]
//! contract. The provider owns a small tokio runtime; every provider call is
//! a `block_on` on it, and one dispatcher task per connection forwards the
//! notification stream to the callbacks registered through
//! [`BleProvider::subscribe`], keyed by characteristic.
//!
//! Only compiled with the `ble` cargo feature.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::provider::{
    AdvertisedPeripheral, BleProvider, CharProperties, GattCharacteristic, GattService,
    NotificationCallback, PeripheralHandle, PeripheralId,
};
use crate::error::{BioStreamError, Result};

/// Upper bound on service discovery
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

type CallbackTable = Arc<Mutex<HashMap<Uuid, NotificationCallback>>>;

fn ble_err(e: btleplug::Error) -> BioStreamError {
    BioStreamError::Ble(e.to_string())
}

fn props_from_flags(flags: CharPropFlags) -> CharProperties {
    CharProperties {
        broadcast: flags.contains(CharPropFlags::BROADCAST),
        read: flags.contains(CharPropFlags::READ),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        write: flags.contains(CharPropFlags::WRITE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

/// BLE provider on top of the platform stack (BlueZ, CoreBluetooth, WinRT)
pub struct BtleProvider {
    runtime: Runtime,
    adapter: Option<Adapter>,
    scanned: HashMap<PeripheralId, Peripheral>,
    connected: Option<Peripheral>,
    callbacks: CallbackTable,
    dispatcher: Option<JoinHandle<()>>,
}

impl BtleProvider {
    /// Create a provider with its own runtime
    ///
    /// The adapter is resolved on the first scan.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("biostream-ble")
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            adapter: None,
            scanned: HashMap::new(),
            connected: None,
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: None,
        })
    }

    fn adapter(&mut self) -> Result<Adapter> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let adapter = self.runtime.block_on(async {
            let manager = Manager::new().await.map_err(ble_err)?;
            let adapters = manager.adapters().await.map_err(ble_err)?;
            adapters
                .into_iter()
                .next()
                .ok_or_else(|| BioStreamError::Ble("No Bluetooth adapter found".to_string()))
        })?;
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    fn peripheral(&self, handle: &PeripheralHandle) -> Result<Peripheral> {
        match &self.connected {
            Some(p) if PeripheralId::new(p.id().to_string()) == *handle.id() => Ok(p.clone()),
            _ => Err(BioStreamError::Disconnected),
        }
    }

    fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Option<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
    }

    /// Stop routing notifications
    ///
    /// Waits for the dispatcher to finish, so no callback is still running
    /// when this returns.
    fn stop_dispatcher(&mut self) {
        if let Some(task) = self.dispatcher.take() {
            task.abort();
            if let Err(e) = self.runtime.block_on(task) {
                if !e.is_cancelled() {
                    tracing::warn!("Notification dispatcher failed: {}", e);
                }
            }
        }
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.clear();
        }
    }
}

impl BleProvider for BtleProvider {
    fn scan(&mut self, timeout: Duration) -> Result<Vec<AdvertisedPeripheral>> {
        let adapter = self.adapter()?;

        let found = self.runtime.block_on(async move {
            adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(ble_err)?;
            tokio::time::sleep(timeout).await;
            adapter.stop_scan().await.ok();

            let mut found = Vec::new();
            for p in adapter.peripherals().await.map_err(ble_err)? {
                let props = p.properties().await.ok().flatten();
                let advertised = AdvertisedPeripheral {
                    id: PeripheralId::new(p.id().to_string()),
                    name: props.as_ref().and_then(|props| props.local_name.clone()),
                    rssi: props.as_ref().and_then(|props| props.rssi),
                };
                found.push((advertised, p));
            }
            Ok::<_, BioStreamError>(found)
        })?;

        self.scanned.clear();
        let mut advertised = Vec::with_capacity(found.len());
        for (ad, p) in found {
            self.scanned.insert(ad.id.clone(), p);
            advertised.push(ad);
        }
        Ok(advertised)
    }

    fn connect(
        &mut self,
        peripheral: &AdvertisedPeripheral,
        timeout: Duration,
    ) -> Result<PeripheralHandle> {
        let p = self.scanned.get(&peripheral.id).cloned().ok_or_else(|| {
            BioStreamError::Connection(format!("{} was not seen in the last scan", peripheral.id))
        })?;

        let callbacks = self.callbacks.clone();
        let target = p.clone();
        let notifications = self.runtime.block_on(async move {
            tokio::time::timeout(timeout, target.connect())
                .await
                .map_err(|_| {
                    BioStreamError::Connection(format!("connect timed out after {:?}", timeout))
                })?
                .map_err(|e| BioStreamError::Connection(e.to_string()))?;
            target.notifications().await.map_err(ble_err)
        })?;

        let dispatcher = self.runtime.spawn(async move {
            let mut notifications = notifications;
            while let Some(notification) = notifications.next().await {
                let Ok(callbacks) = callbacks.lock() else {
                    break;
                };
                match callbacks.get(&notification.uuid) {
                    Some(callback) => callback(&notification.value),
                    None => tracing::trace!("Unrouted notification on {}", notification.uuid),
                }
            }
            tracing::debug!("Notification stream ended");
        });

        self.stop_dispatcher();
        self.dispatcher = Some(dispatcher);
        self.connected = Some(p);

        let name = peripheral.name.clone().unwrap_or_default();
        Ok(PeripheralHandle::new(peripheral.id.clone(), name))
    }

    fn enumerate(&mut self, handle: &PeripheralHandle) -> Result<Vec<GattService>> {
        let p = self.peripheral(handle)?;
        let target = p.clone();
        self.runtime.block_on(async move {
            tokio::time::timeout(DISCOVERY_TIMEOUT, target.discover_services())
                .await
                .map_err(|_| BioStreamError::Ble("service discovery timed out".to_string()))?
                .map_err(ble_err)
        })?;

        let services = p
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                primary: service.primary,
                characteristics: service
                    .characteristics
                    .iter()
                    .map(|c| GattCharacteristic {
                        uuid: c.uuid,
                        service: c.service_uuid,
                        properties: props_from_flags(c.properties),
                        descriptors: c.descriptors.iter().map(|d| d.uuid).collect(),
                    })
                    .collect(),
            })
            .collect();
        Ok(services)
    }

    fn read_characteristic(
        &mut self,
        handle: &PeripheralHandle,
        characteristic: Uuid,
    ) -> Result<Vec<u8>> {
        let p = self.peripheral(handle)?;
        let c = Self::find_characteristic(&p, characteristic).ok_or_else(|| {
            BioStreamError::CharacteristicRead {
                uuid: characteristic,
                message: "not found".to_string(),
            }
        })?;

        self.runtime
            .block_on(async move { p.read(&c).await })
            .map_err(|e| BioStreamError::CharacteristicRead {
                uuid: characteristic,
                message: e.to_string(),
            })
    }

    fn read_descriptor(
        &mut self,
        handle: &PeripheralHandle,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Vec<u8>> {
        let p = self.peripheral(handle)?;
        let d = Self::find_characteristic(&p, characteristic)
            .and_then(|c| c.descriptors.into_iter().find(|d| d.uuid == descriptor))
            .ok_or_else(|| BioStreamError::DescriptorRead {
                uuid: descriptor,
                message: "not found".to_string(),
            })?;

        self.runtime
            .block_on(async move { p.read_descriptor(&d).await })
            .map_err(|e| BioStreamError::DescriptorRead {
                uuid: descriptor,
                message: e.to_string(),
            })
    }

    fn subscribe(
        &mut self,
        handle: &PeripheralHandle,
        characteristic: &GattCharacteristic,
        callback: NotificationCallback,
    ) -> Result<()> {
        let p = self.peripheral(handle)?;
        let c = p
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
            .ok_or_else(|| {
                BioStreamError::Ble(format!("characteristic {} not found", characteristic.uuid))
            })?;

        self.callbacks
            .lock()
            .map_err(|_| BioStreamError::Ble("callback table poisoned".to_string()))?
            .insert(c.uuid, callback);

        self.runtime
            .block_on(async move { p.subscribe(&c).await })
            .map_err(ble_err)
    }

    fn is_connected(&mut self, handle: &PeripheralHandle) -> bool {
        let Ok(p) = self.peripheral(handle) else {
            return false;
        };
        self.runtime
            .block_on(async move { p.is_connected().await })
            .unwrap_or(false)
    }

    fn disconnect(&mut self, handle: &PeripheralHandle) {
        self.stop_dispatcher();
        let Ok(p) = self.peripheral(handle) else {
            return;
        };
        self.connected = None;

        if let Err(e) = self.runtime.block_on(async move { p.disconnect().await }) {
            tracing::warn!("Disconnect from {} failed: {}", handle.id(), e);
        }
    }
}
