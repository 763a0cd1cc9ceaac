//! Test data builders for creating test objects

use biostream::config::{AppConfig, DuplicatePolicy};
use std::path::Path;

/// Builder for pipeline configurations tuned for fast tests
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    /// Defaults with a zero scan timeout and a 10 ms liveness check
    pub fn new(output_dir: &Path) -> Self {
        let mut config = AppConfig::default();
        config.device.scan_timeout_secs = 0;
        config.session.liveness_interval_ms = 10;
        config.persistence.output_dir = output_dir.to_path_buf();
        Self { config }
    }

    pub fn target(mut self, name: &str) -> Self {
        self.config.device.target_name = name.to_string();
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.config.device.duplicate_policy = policy;
        self
    }

    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.config.session.window_capacity = capacity;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new(Path::new("/tmp/out"))
            .target("BENCH")
            .window_capacity(16)
            .build();

        assert_eq!(config.device.target_name, "BENCH");
        assert_eq!(config.session.window_capacity, 16);
        assert_eq!(config.device.scan_timeout_secs, 0);
        assert!(config.validate().is_ok());
    }
}
