//! BleProvider trait for a unified BLE stack interface
//!
//! This module defines the contract the pipeline needs from a Bluetooth LE
//! stack: scan, connect, enumerate, subscribe, liveness and disconnect. Both
//! the btleplug-backed provider and the simulated peripheral used for tests
//! implement it.
//!
//! Calls are blocking from the caller's point of view; a provider backed by
//! an async stack drives its own runtime internally. Notifications are pushed
//! by the provider on a context of its choosing through the callback given to
//! [`BleProvider::subscribe`].

use crate::error::Result;
use std::time::Duration;
use uuid::Uuid;

/// Callback invoked with the payload of every notification
pub type NotificationCallback = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Platform identifier of a peripheral
///
/// A MAC address on Linux, a UUID string on macOS and Windows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(pub String);

impl PeripheralId {
    /// Create a new identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A peripheral seen during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisedPeripheral {
    /// Platform identifier
    pub id: PeripheralId,
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Signal strength of the last advertisement
    pub rssi: Option<i16>,
}

impl AdvertisedPeripheral {
    /// Create a new advertisement record
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: PeripheralId::new(id),
            name: name.map(str::to_string),
            rssi: None,
        }
    }
}

impl std::fmt::Display for AdvertisedPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.name.as_deref().unwrap_or("<unnamed>");
        match self.rssi {
            Some(rssi) => write!(f, "{}: {} (rssi {})", self.id, name, rssi),
            None => write!(f, "{}: {}", self.id, name),
        }
    }
}

/// An open connection to a peripheral
///
/// Not `Clone`: the connection session is the sole owner and the only caller
/// of provider operations against it.
#[derive(Debug, PartialEq, Eq)]
pub struct PeripheralHandle {
    id: PeripheralId,
    name: String,
}

impl PeripheralHandle {
    /// Create a handle; called by providers on successful connect
    pub fn new(id: PeripheralId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Platform identifier of the connected peripheral
    pub fn id(&self) -> &PeripheralId {
        &self.id
    }

    /// Advertised name of the connected peripheral
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// GATT characteristic properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharProperties {
    pub broadcast: bool,
    pub read: bool,
    pub write_without_response: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharProperties {
    /// Read + notify, the shape of the acquisition board's data characteristics
    pub fn read_notify() -> Self {
        Self {
            read: true,
            notify: true,
            ..Self::default()
        }
    }

    /// Property names in GATT order
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.broadcast {
            names.push("broadcast");
        }
        if self.read {
            names.push("read");
        }
        if self.write_without_response {
            names.push("write-without-response");
        }
        if self.write {
            names.push("write");
        }
        if self.notify {
            names.push("notify");
        }
        if self.indicate {
            names.push("indicate");
        }
        names
    }
}

impl std::fmt::Display for CharProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names().join(","))
    }
}

/// A characteristic as reported by service discovery
#[derive(Debug, Clone, PartialEq)]
pub struct GattCharacteristic {
    /// Characteristic identifier
    pub uuid: Uuid,
    /// Owning service identifier
    pub service: Uuid,
    /// Supported operations
    pub properties: CharProperties,
    /// Descriptor identifiers
    pub descriptors: Vec<Uuid>,
}

/// A service as reported by service discovery
#[derive(Debug, Clone, PartialEq)]
pub struct GattService {
    /// Service identifier
    pub uuid: Uuid,
    /// Whether this is a primary service
    pub primary: bool,
    /// Characteristics in discovery order
    pub characteristics: Vec<GattCharacteristic>,
}

/// Unified interface for BLE stacks
///
/// Implementations must be `Send` so the connection session can own the
/// provider on its own thread.
///
/// # Example
///
/// ```ignore
/// fn names(provider: &mut dyn BleProvider) -> Result<Vec<String>> {
///     let found = provider.scan(Duration::from_secs(5))?;
///     Ok(found.into_iter().filter_map(|p| p.name).collect())
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait BleProvider: Send {
    /// Scan for advertising peripherals for `timeout`
    fn scan(&mut self, timeout: Duration) -> Result<Vec<AdvertisedPeripheral>>;

    /// Open a connection to a scanned peripheral
    fn connect(&mut self, peripheral: &AdvertisedPeripheral, timeout: Duration)
        -> Result<PeripheralHandle>;

    /// List services, characteristics and descriptors
    fn enumerate(&mut self, handle: &PeripheralHandle) -> Result<Vec<GattService>>;

    /// Read a characteristic value (diagnostics only)
    fn read_characteristic(&mut self, handle: &PeripheralHandle, characteristic: Uuid)
        -> Result<Vec<u8>>;

    /// Read a descriptor value (diagnostics only)
    fn read_descriptor(
        &mut self,
        handle: &PeripheralHandle,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Vec<u8>>;

    /// Register `callback` for notifications raised by `characteristic`
    fn subscribe(
        &mut self,
        handle: &PeripheralHandle,
        characteristic: &GattCharacteristic,
        callback: NotificationCallback,
    ) -> Result<()>;

    /// Whether the link is still up
    fn is_connected(&mut self, handle: &PeripheralHandle) -> bool;

    /// Tear down the link and drop every subscription
    fn disconnect(&mut self, handle: &PeripheralHandle);
}

impl<P: BleProvider + ?Sized> BleProvider for Box<P> {
    fn scan(&mut self, timeout: Duration) -> Result<Vec<AdvertisedPeripheral>> {
        (**self).scan(timeout)
    }

    fn connect(
        &mut self,
        peripheral: &AdvertisedPeripheral,
        timeout: Duration,
    ) -> Result<PeripheralHandle> {
        (**self).connect(peripheral, timeout)
    }

    fn enumerate(&mut self, handle: &PeripheralHandle) -> Result<Vec<GattService>> {
        (**self).enumerate(handle)
    }

    fn read_characteristic(
        &mut self,
        handle: &PeripheralHandle,
        characteristic: Uuid,
    ) -> Result<Vec<u8>> {
        (**self).read_characteristic(handle, characteristic)
    }

    fn read_descriptor(
        &mut self,
        handle: &PeripheralHandle,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Vec<u8>> {
        (**self).read_descriptor(handle, characteristic, descriptor)
    }

    fn subscribe(
        &mut self,
        handle: &PeripheralHandle,
        characteristic: &GattCharacteristic,
        callback: NotificationCallback,
    ) -> Result<()> {
        (**self).subscribe(handle, characteristic, callback)
    }

    fn is_connected(&mut self, handle: &PeripheralHandle) -> bool {
        (**self).is_connected(handle)
    }

    fn disconnect(&mut self, handle: &PeripheralHandle) {
        (**self).disconnect(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_properties_display() {
        let props = CharProperties {
            read: true,
            write_without_response: true,
            notify: true,
            ..CharProperties::default()
        };
        assert_eq!(props.to_string(), "read,write-without-response,notify");
        assert_eq!(CharProperties::default().to_string(), "");
    }

    #[test]
    fn test_advertised_peripheral_display() {
        let mut p = AdvertisedPeripheral::new("AA:BB:CC:DD:EE:FF", Some("ESP_SPP_SERVER"));
        assert_eq!(p.to_string(), "AA:BB:CC:DD:EE:FF: ESP_SPP_SERVER");

        p.rssi = Some(-60);
        p.name = None;
        assert_eq!(p.to_string(), "AA:BB:CC:DD:EE:FF: <unnamed> (rssi -60)");
    }

    #[test]
    fn test_handle_accessors() {
        let handle = PeripheralHandle::new(PeripheralId::new("dev-1"), "ESP_SPP_SERVER");
        assert_eq!(handle.id().0, "dev-1");
        assert_eq!(handle.name(), "ESP_SPP_SERVER");
    }
}
