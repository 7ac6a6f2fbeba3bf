//! Registry configuration.

use crate::core::serde_util::duration_ms;
use crate::core::OperationKind;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the operation registry and its idle reaper.
///
/// Durations serialize as milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Idle limit for scan operations.
    #[serde(with = "duration_ms")]
    pub scan_idle_timeout: Duration,

    /// Idle limit for chat operations.
    #[serde(with = "duration_ms")]
    pub chat_idle_timeout: Duration,

    /// Idle limit for download operations.
    #[serde(with = "duration_ms")]
    pub download_idle_timeout: Duration,

    /// How often the reaper sweeps.
    #[serde(with = "duration_ms")]
    pub sweep_interval: Duration,

    /// How long new operations are refused after a global stop.
    #[serde(with = "duration_ms")]
    pub global_stop_cooldown: Duration,

    /// Largest file accepted for scanning, in bytes.
    pub max_file_size: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            scan_idle_timeout: Duration::from_secs(15 * 60),
            chat_idle_timeout: Duration::from_secs(5 * 60),
            download_idle_timeout: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(2 * 60),
            global_stop_cooldown: Duration::from_secs(3),
            max_file_size: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

impl RegistryConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the idle limit for one operation kind.
    pub fn with_idle_timeout(mut self, kind: OperationKind, timeout: Duration) -> Self {
        match kind {
            OperationKind::Scan => self.scan_idle_timeout = timeout,
            OperationKind::Chat => self.chat_idle_timeout = timeout,
            OperationKind::Download => self.download_idle_timeout = timeout,
        }
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the global-stop cooldown.
    pub fn with_global_stop_cooldown(mut self, cooldown: Duration) -> Self {
        self.global_stop_cooldown = cooldown;
        self
    }

    /// Sets the maximum file size.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Returns the idle limit for an operation kind.
    pub fn idle_timeout(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::Scan => self.scan_idle_timeout,
            OperationKind::Chat => self.chat_idle_timeout,
            OperationKind::Download => self.download_idle_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.idle_timeout(OperationKind::Scan), Duration::from_secs(900));
        assert_eq!(config.idle_timeout(OperationKind::Chat), Duration::from_secs(300));
        assert_eq!(config.idle_timeout(OperationKind::Download), Duration::from_secs(600));
        assert_eq!(config.sweep_interval, Duration::from_secs(120));
        assert_eq!(config.global_stop_cooldown, Duration::from_secs(3));
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::new()
            .with_idle_timeout(OperationKind::Chat, Duration::from_secs(60))
            .with_global_stop_cooldown(Duration::from_secs(5))
            .with_max_file_size(10);

        assert_eq!(config.chat_idle_timeout, Duration::from_secs(60));
        assert_eq!(config.global_stop_cooldown, Duration::from_secs(5));
        assert_eq!(config.max_file_size, 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"scan_idle_timeout": 60000, "max_file_size": 2048}"#).unwrap();
        assert_eq!(config.scan_idle_timeout, Duration::from_secs(60));
        assert_eq!(config.max_file_size, 2048);
        assert_eq!(config.sweep_interval, Duration::from_secs(120));
    }
}
