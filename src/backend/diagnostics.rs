//! Diagnostic GATT walk
//!
//! After connecting, the session reads every readable characteristic and
//! every descriptor once and logs the result. Nothing here affects the data
//! path: each read produces its own `Result` and failures are reported, not
//! propagated.

use uuid::Uuid;

use super::provider::{BleProvider, GattCharacteristic, GattService, PeripheralHandle};
use crate::error::Result;

/// Outcome of reading one descriptor
#[derive(Debug)]
pub struct DescriptorReport {
    pub uuid: Uuid,
    pub value: Result<Vec<u8>>,
}

/// Outcome of reading one characteristic and its descriptors
#[derive(Debug)]
pub struct CharacteristicReport {
    pub characteristic: GattCharacteristic,
    /// `None` when the characteristic is not readable
    pub value: Option<Result<Vec<u8>>>,
    pub descriptors: Vec<DescriptorReport>,
}

/// One service and its characteristics
#[derive(Debug)]
pub struct ServiceReport {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<CharacteristicReport>,
}

/// Result of a full GATT walk
#[derive(Debug, Default)]
pub struct GattReport {
    pub services: Vec<ServiceReport>,
}

impl GattReport {
    /// Number of characteristics seen
    pub fn characteristic_count(&self) -> usize {
        self.services.iter().map(|s| s.characteristics.len()).sum()
    }

    /// Number of characteristic and descriptor reads that failed
    pub fn failed_reads(&self) -> usize {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .map(|c| {
                let value_failed = matches!(c.value, Some(Err(_))) as usize;
                let descriptors_failed = c.descriptors.iter().filter(|d| d.value.is_err()).count();
                value_failed + descriptors_failed
            })
            .sum()
    }

    /// Log the report in walk order
    pub fn log(&self) {
        for service in &self.services {
            let kind = if service.primary { "primary" } else { "secondary" };
            tracing::info!("[Service] {} ({})", service.uuid, kind);

            for report in &service.characteristics {
                let c = &report.characteristic;
                match &report.value {
                    Some(Ok(value)) => tracing::info!(
                        "  [Characteristic] {} ({}), Value: {:02x?}",
                        c.uuid,
                        c.properties,
                        value
                    ),
                    Some(Err(e)) => tracing::info!(
                        "  [Characteristic] {} ({}), Error: {}",
                        c.uuid,
                        c.properties,
                        e
                    ),
                    None => tracing::info!("  [Characteristic] {} ({})", c.uuid, c.properties),
                }

                for descriptor in &report.descriptors {
                    match &descriptor.value {
                        Ok(value) => tracing::info!(
                            "    [Descriptor] {}, Value: {:02x?}",
                            descriptor.uuid,
                            value
                        ),
                        Err(e) => {
                            tracing::error!("    [Descriptor] {}, Error: {}", descriptor.uuid, e)
                        }
                    }
                }
            }
        }
    }
}

/// Read everything readable in `services`
pub fn walk<P: BleProvider + ?Sized>(
    provider: &mut P,
    handle: &PeripheralHandle,
    services: &[GattService],
) -> GattReport {
    let services = services
        .iter()
        .map(|service| ServiceReport {
            uuid: service.uuid,
            primary: service.primary,
            characteristics: service
                .characteristics
                .iter()
                .map(|c| read_characteristic(provider, handle, c))
                .collect(),
        })
        .collect();

    GattReport { services }
}

fn read_characteristic<P: BleProvider + ?Sized>(
    provider: &mut P,
    handle: &PeripheralHandle,
    characteristic: &GattCharacteristic,
) -> CharacteristicReport {
    let value = characteristic
        .properties
        .read
        .then(|| provider.read_characteristic(handle, characteristic.uuid));

    let descriptors = characteristic
        .descriptors
        .iter()
        .map(|&uuid| DescriptorReport {
            uuid,
            value: provider.read_descriptor(handle, characteristic.uuid, uuid),
        })
        .collect();

    CharacteristicReport {
        characteristic: characteristic.clone(),
        value,
        descriptors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::provider::{AdvertisedPeripheral, CharProperties};
    use crate::backend::simulated::{SimulatedPeripheral, CCCD_UUID};
    use crate::config::{ChannelBinding, BLOOD_PRESSURE_CHAR_UUID, HEART_SOUND_CHAR_UUID};
    use std::time::Duration;

    fn connected(sim: &mut SimulatedPeripheral) -> PeripheralHandle {
        let target = AdvertisedPeripheral::new("AA", Some("ESP_SPP_SERVER"));
        sim.connect(&target, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_walk_reads_values_and_descriptors() {
        let mut sim = SimulatedPeripheral::new()
            .with_acquisition_board("AA", "ESP_SPP_SERVER", &ChannelBinding::defaults())
            .with_value(HEART_SOUND_CHAR_UUID, vec![0x34, 0x12]);
        let handle = connected(&mut sim);
        let services = sim.enumerate(&handle).unwrap();

        let report = walk(&mut sim, &handle, &services);
        assert_eq!(report.characteristic_count(), 2);
        assert_eq!(report.failed_reads(), 0);

        let hs = &report.services[0].characteristics[0];
        assert!(matches!(&hs.value, Some(Ok(v)) if v == &vec![0x34, 0x12]));
        assert_eq!(hs.descriptors.len(), 1);
        assert_eq!(hs.descriptors[0].uuid, CCCD_UUID);
    }

    #[test]
    fn test_failures_are_collected_not_fatal() {
        let mut sim = SimulatedPeripheral::new()
            .with_acquisition_board("AA", "ESP_SPP_SERVER", &ChannelBinding::defaults())
            .with_failing_read(HEART_SOUND_CHAR_UUID)
            .with_failing_descriptors(BLOOD_PRESSURE_CHAR_UUID);
        let handle = connected(&mut sim);
        let services = sim.enumerate(&handle).unwrap();

        let report = walk(&mut sim, &handle, &services);
        assert_eq!(report.characteristic_count(), 2);
        assert_eq!(report.failed_reads(), 2);
        report.log();
    }

    #[test]
    fn test_unreadable_characteristic_is_not_read() {
        let write_only = Uuid::from_u128(0x1234);
        let mut sim = SimulatedPeripheral::new()
            .with_advertisement("AA", Some("ESP_SPP_SERVER"))
            .with_service(GattService {
                uuid: Uuid::from_u128(0x1000),
                primary: true,
                characteristics: vec![GattCharacteristic {
                    uuid: write_only,
                    service: Uuid::from_u128(0x1000),
                    properties: CharProperties {
                        write: true,
                        ..CharProperties::default()
                    },
                    descriptors: Vec::new(),
                }],
            })
            .with_failing_read(write_only);
        let handle = connected(&mut sim);
        let services = sim.enumerate(&handle).unwrap();

        let report = walk(&mut sim, &handle, &services);
        assert!(report.services[0].characteristics[0].value.is_none());
        assert_eq!(report.failed_reads(), 0);
    }
}
