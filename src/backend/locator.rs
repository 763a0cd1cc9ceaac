//! Device locator
//!
//! Scans once and picks the peripheral whose advertised name equals the
//! configured target name exactly. When several peripherals share the name
//! the configured [`DuplicatePolicy`] decides which one is returned.

use std::time::Duration;

use super::provider::{AdvertisedPeripheral, BleProvider};
use crate::config::{DeviceConfig, DuplicatePolicy};
use crate::error::{BioStreamError, Result};

/// Find the target peripheral described by `device`
pub fn discover<P: BleProvider + ?Sized>(
    provider: &mut P,
    device: &DeviceConfig,
) -> Result<AdvertisedPeripheral> {
    discover_named(
        provider,
        &device.target_name,
        device.scan_timeout(),
        device.duplicate_policy,
    )
}

/// Scan for `timeout` and select the peripheral advertising `target_name`
///
/// Fails with [`BioStreamError::PeripheralNotFound`] when the scan completes
/// without a match.
pub fn discover_named<P: BleProvider + ?Sized>(
    provider: &mut P,
    target_name: &str,
    timeout: Duration,
    policy: DuplicatePolicy,
) -> Result<AdvertisedPeripheral> {
    tracing::info!("Scanning for \"{}\" ({:?})", target_name, timeout);
    let found = provider.scan(timeout)?;

    tracing::info!("list of available devices:");
    for peripheral in &found {
        tracing::info!("[Device] {}", peripheral);
    }

    let matches = found
        .into_iter()
        .filter(|p| p.name.as_deref() == Some(target_name));
    let (chosen, count) = policy.select(matches);

    match chosen {
        Some(peripheral) => {
            if count > 1 {
                tracing::warn!(
                    "{} peripherals advertise as \"{}\", using {} ({})",
                    count,
                    target_name,
                    peripheral.id,
                    policy
                );
            }
            tracing::info!("found {} ({})", target_name, peripheral.id);
            Ok(peripheral)
        }
        None => {
            tracing::error!("not found {}", target_name);
            Err(BioStreamError::PeripheralNotFound {
                name: target_name.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::provider::MockBleProvider;

    fn advertised() -> Vec<AdvertisedPeripheral> {
        vec![
            AdvertisedPeripheral::new("01", Some("Headphones")),
            AdvertisedPeripheral::new("02", Some("ESP_SPP_SERVER")),
            AdvertisedPeripheral::new("03", None),
            AdvertisedPeripheral::new("04", Some("ESP_SPP_SERVER")),
        ]
    }

    fn mock_scan(result: Vec<AdvertisedPeripheral>) -> MockBleProvider {
        let mut mock = MockBleProvider::new();
        mock.expect_scan().times(1).return_once(move |_| Ok(result));
        mock.expect_connect().never();
        mock
    }

    #[test]
    fn test_last_seen_wins_by_default() {
        let mut mock = mock_scan(advertised());
        let found = discover(&mut mock, &DeviceConfig::default()).unwrap();
        assert_eq!(found.id.0, "04");
    }

    #[test]
    fn test_first_seen_policy() {
        let mut mock = mock_scan(advertised());
        let found = discover_named(
            &mut mock,
            "ESP_SPP_SERVER",
            Duration::from_secs(1),
            DuplicatePolicy::FirstSeen,
        )
        .unwrap();
        assert_eq!(found.id.0, "02");
    }

    #[test]
    fn test_name_must_match_exactly() {
        let mut mock = mock_scan(vec![
            AdvertisedPeripheral::new("01", Some("esp_spp_server")),
            AdvertisedPeripheral::new("02", Some("ESP_SPP_SERVER_2")),
        ]);
        let result = discover(&mut mock, &DeviceConfig::default());
        assert!(matches!(
            result,
            Err(BioStreamError::PeripheralNotFound { ref name }) if name == "ESP_SPP_SERVER"
        ));
    }

    #[test]
    fn test_empty_scan_is_not_found() {
        let mut mock = mock_scan(Vec::new());
        assert!(discover(&mut mock, &DeviceConfig::default()).is_err());
    }

    #[test]
    fn test_scan_error_propagates() {
        let mut mock = MockBleProvider::new();
        mock.expect_scan()
            .return_once(|_| Err(BioStreamError::Ble("adapter powered off".to_string())));
        let result = discover(&mut mock, &DeviceConfig::default());
        assert!(matches!(result, Err(BioStreamError::Ble(_))));
    }
}
