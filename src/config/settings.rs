//! Configuration sections
//!
//! Each section maps to one TOML table of the configuration file. Every
//! field has a serde default so partial files load cleanly.
//!
//! # Sections
//!
//! - [`DeviceConfig`] - Which peripheral to look for and how long to scan
//! - [`ChannelBinding`] - Characteristic identifier bound to a [`SignalKind`]
//! - [`SessionConfig`] - Connection timing and window sizing
//! - [`PersistenceConfig`] - Where and how sink files are written
//! - [`LoggingConfig`] - Optional rolling log file

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::types::{SignalKind, WINDOW_CAPACITY};

/// Advertised name of the acquisition board
pub const DEFAULT_TARGET_NAME: &str = "ESP_SPP_SERVER";

/// Heart-sound notification characteristic
pub const HEART_SOUND_CHAR_UUID: Uuid = Uuid::from_u128(0xcdd4c6c4_7a3c_599b_324e_f93750d2f002);

/// Blood-pressure notification characteristic
pub const BLOOD_PRESSURE_CHAR_UUID: Uuid =
    Uuid::from_u128(0xcdd4c6c4_7a3c_599b_324e_f93750d2f003);

/// Default BLE scan duration in seconds
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 5;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default interval between liveness checks in milliseconds
pub const DEFAULT_LIVENESS_INTERVAL_MS: u64 = 1000;

/// Default number of records between sink flushes
pub const DEFAULT_FLUSH_EVERY: usize = 1;

/// Default chrono format for the session timestamp in sink file names
pub const DEFAULT_FILE_TIMESTAMP_FORMAT: &str = "%d_%m_%Y_%H_%M";

/// Which match to keep when several candidates share a name or identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the last candidate in enumeration order
    #[default]
    LastSeen,
    /// Keep the first candidate in enumeration order
    FirstSeen,
}

impl DuplicatePolicy {
    /// Pick one candidate from `matches` according to the policy
    ///
    /// Returns the chosen candidate and the total number of matches.
    pub fn select<T>(self, matches: impl IntoIterator<Item = T>) -> (Option<T>, usize) {
        let mut chosen = None;
        let mut count = 0;
        for candidate in matches {
            count += 1;
            match self {
                DuplicatePolicy::LastSeen => chosen = Some(candidate),
                DuplicatePolicy::FirstSeen => {
                    if chosen.is_none() {
                        chosen = Some(candidate);
                    }
                }
            }
        }
        (chosen, count)
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::LastSeen => write!(f, "last seen"),
            DuplicatePolicy::FirstSeen => write!(f, "first seen"),
        }
    }
}

/// Peripheral selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Exact advertised name of the peripheral
    #[serde(default = "default_target_name")]
    pub target_name: String,

    /// How long to scan before giving up, in seconds
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Tie-break when several peripherals or characteristics match
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

fn default_target_name() -> String {
    DEFAULT_TARGET_NAME.to_string()
}

fn default_scan_timeout_secs() -> u64 {
    DEFAULT_SCAN_TIMEOUT_SECS
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            target_name: default_target_name(),
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl DeviceConfig {
    /// Scan duration as a [`Duration`]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

/// A characteristic bound to a signal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBinding {
    /// Logical stream fed by the characteristic
    pub kind: SignalKind,
    /// Characteristic identifier on the peripheral
    pub characteristic: Uuid,
}

impl ChannelBinding {
    /// Create a new binding
    pub fn new(kind: SignalKind, characteristic: Uuid) -> Self {
        Self {
            kind,
            characteristic,
        }
    }

    /// The bindings of the stock acquisition firmware
    pub fn defaults() -> Vec<ChannelBinding> {
        vec![
            ChannelBinding::new(SignalKind::HeartSound, HEART_SOUND_CHAR_UUID),
            ChannelBinding::new(SignalKind::BloodPressure, BLOOD_PRESSURE_CHAR_UUID),
        ]
    }
}

/// Connection session timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between liveness checks while streaming, in milliseconds
    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Samples kept per signal for live display
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
}

fn default_liveness_interval_ms() -> u64 {
    DEFAULT_LIVENESS_INTERVAL_MS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_window_capacity() -> usize {
    WINDOW_CAPACITY
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_interval_ms: DEFAULT_LIVENESS_INTERVAL_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            window_capacity: WINDOW_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Liveness interval as a [`Duration`]
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Sink file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory receiving the per-signal CSV files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Flush the buffered writer after this many records
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,

    /// chrono format string for the session timestamp in file names
    #[serde(default = "default_file_timestamp_format")]
    pub file_timestamp_format: String,

    /// Write a JSON session summary next to the CSV files
    #[serde(default = "default_true")]
    pub write_summary: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_flush_every() -> usize {
    DEFAULT_FLUSH_EVERY
}

fn default_file_timestamp_format() -> String {
    DEFAULT_FILE_TIMESTAMP_FORMAT.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            flush_every: DEFAULT_FLUSH_EVERY,
            file_timestamp_format: default_file_timestamp_format(),
            write_summary: true,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for a daily rolling log file; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_policy_last_seen() {
        let (chosen, count) = DuplicatePolicy::LastSeen.select(vec!["a", "b", "c"]);
        assert_eq!(chosen, Some("c"));
        assert_eq!(count, 3);
    }

    #[test]
    fn test_duplicate_policy_first_seen() {
        let (chosen, count) = DuplicatePolicy::FirstSeen.select(vec!["a", "b", "c"]);
        assert_eq!(chosen, Some("a"));
        assert_eq!(count, 3);
    }

    #[test]
    fn test_duplicate_policy_no_match() {
        let (chosen, count) = DuplicatePolicy::LastSeen.select(Vec::<u32>::new());
        assert!(chosen.is_none());
        assert_eq!(count, 0);
    }

    #[test]
    fn test_default_bindings() {
        let bindings = ChannelBinding::defaults();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].kind, SignalKind::HeartSound);
        assert_eq!(
            bindings[0].characteristic.to_string(),
            "cdd4c6c4-7a3c-599b-324e-f93750d2f002"
        );
        assert_eq!(
            bindings[1].characteristic.to_string(),
            "cdd4c6c4-7a3c-599b-324e-f93750d2f003"
        );
    }

    #[test]
    fn test_durations() {
        let session = SessionConfig::default();
        assert_eq!(session.liveness_interval(), Duration::from_secs(1));
        assert_eq!(DeviceConfig::default().scan_timeout(), Duration::from_secs(5));
    }
}
