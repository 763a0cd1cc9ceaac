//! Configuration module for biostream
//!
//! This module handles the pipeline configuration file:
//! - Locating the file (explicit path, `BIOSTREAM_CONFIG`, or the app data dir)
//! - Loading and saving TOML
//! - Validating channel bindings and timing values
//!
//! # App Data Location
//!
//! The default configuration lives in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.biostream/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.biostream/config.toml`
//! - **Windows**: `%APPDATA%\dev.biostream\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use biostream::config::AppConfig;
//!
//! let path = AppConfig::resolve_path(None);
//! let config = AppConfig::load_or_default(path.as_deref());
//! config.validate()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{BioStreamError, Result};
use crate::types::SignalKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.biostream";

/// Configuration filename
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the configuration path
pub const CONFIG_ENV_VAR: &str = "BIOSTREAM_CONFIG";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default configuration file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== App Config ====================

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Peripheral selection
    #[serde(default)]
    pub device: DeviceConfig,

    /// Connection session timing
    #[serde(default)]
    pub session: SessionConfig,

    /// Sink file settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Characteristic bindings, one per signal kind
    #[serde(default = "ChannelBinding::defaults")]
    pub channels: Vec<ChannelBinding>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            session: SessionConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
            channels: ChannelBinding::defaults(),
        }
    }
}

impl AppConfig {
    /// Work out which configuration file to use
    ///
    /// An explicit path wins, then `BIOSTREAM_CONFIG`, then the app data dir.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
            _ => default_config_path(),
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BioStreamError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Render the configuration as TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| BioStreamError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BioStreamError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a configuration file, returning defaults when it is missing or invalid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Self::default();
        }

        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BioStreamError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| {
            BioStreamError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.device.target_name.trim().is_empty() {
            return Err(BioStreamError::Config(
                "device.target_name must not be empty".to_string(),
            ));
        }
        if self.session.liveness_interval_ms == 0 {
            return Err(BioStreamError::Config(
                "session.liveness_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.session.window_capacity == 0 {
            return Err(BioStreamError::Config(
                "session.window_capacity must be greater than zero".to_string(),
            ));
        }
        if self.persistence.flush_every == 0 {
            return Err(BioStreamError::Config(
                "persistence.flush_every must be greater than zero".to_string(),
            ));
        }
        if self.channels.is_empty() {
            return Err(BioStreamError::Config(
                "at least one channel binding is required".to_string(),
            ));
        }

        let mut kinds = HashSet::new();
        let mut characteristics = HashSet::new();
        for binding in &self.channels {
            if !kinds.insert(binding.kind) {
                return Err(BioStreamError::Config(format!(
                    "signal {} is bound more than once",
                    binding.kind
                )));
            }
            if !characteristics.insert(binding.characteristic) {
                return Err(BioStreamError::Config(format!(
                    "characteristic {} is bound to more than one signal",
                    binding.characteristic
                )));
            }
        }

        Ok(())
    }

    /// Characteristic bound to `kind`, if any
    pub fn characteristic_for(&self, kind: SignalKind) -> Option<Uuid> {
        self.channels
            .iter()
            .find(|b| b.kind == kind)
            .map(|b| b.characteristic)
    }

    /// Signal kind bound to `characteristic`, if any
    pub fn kind_for(&self, characteristic: Uuid) -> Option<SignalKind> {
        self.channels
            .iter()
            .find(|b| b.characteristic == characteristic)
            .map(|b| b.kind)
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_app_config_default_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.target_name, "ESP_SPP_SERVER");
        assert_eq!(config.channels.len(), 2);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = AppConfig::default();
        config.device.target_name = "BENCH_BOARD".to_string();
        config.device.duplicate_policy = DuplicatePolicy::FirstSeen;
        config.persistence.output_dir = PathBuf::from("/tmp/recordings");

        let text = config.to_toml_string().unwrap();
        let parsed = AppConfig::from_toml_str(&text).unwrap();

        assert_eq!(parsed.device.target_name, "BENCH_BOARD");
        assert_eq!(parsed.device.duplicate_policy, DuplicatePolicy::FirstSeen);
        assert_eq!(parsed.persistence.output_dir, PathBuf::from("/tmp/recordings"));
        assert_eq!(parsed.channels, config.channels);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = AppConfig::from_toml_str(
            r#"
            [device]
            target_name = "OTHER"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.device.target_name, "OTHER");
        assert_eq!(parsed.device.scan_timeout_secs, DEFAULT_SCAN_TIMEOUT_SECS);
        assert_eq!(parsed.session.window_capacity, 200);
        assert_eq!(parsed.channels, ChannelBinding::defaults());
    }

    #[test]
    fn test_duplicate_characteristic_rejected() {
        let mut config = AppConfig::default();
        config.channels[1].characteristic = config.channels[0].characteristic;
        assert!(matches!(config.validate(), Err(BioStreamError::Config(_))));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let mut config = AppConfig::default();
        config.channels[1].kind = SignalKind::HeartSound;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = AppConfig::default();
        config.session.liveness_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_binding_lookup() {
        let config = AppConfig::default();
        assert_eq!(
            config.characteristic_for(SignalKind::HeartSound),
            Some(HEART_SOUND_CHAR_UUID)
        );
        assert_eq!(
            config.kind_for(BLOOD_PRESSURE_CHAR_UUID),
            Some(SignalKind::BloodPressure)
        );
        assert_eq!(config.kind_for(Uuid::nil()), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.session.liveness_interval_ms = 250;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.session.liveness_interval_ms, 250);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(Some(&dir.path().join("absent.toml")));
        assert_eq!(config.device.target_name, DEFAULT_TARGET_NAME);
    }

    #[test]
    #[serial]
    fn test_resolve_path_env_override() {
        std::env::set_var(CONFIG_ENV_VAR, "/etc/biostream/custom.toml");
        let resolved = AppConfig::resolve_path(None);
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(resolved, Some(PathBuf::from("/etc/biostream/custom.toml")));
    }

    #[test]
    #[serial]
    fn test_resolve_path_explicit_wins() {
        std::env::set_var(CONFIG_ENV_VAR, "/etc/biostream/custom.toml");
        let resolved = AppConfig::resolve_path(Some(Path::new("local.toml")));
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(resolved, Some(PathBuf::from("local.toml")));
    }
}
