//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `pulselink.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use serde::Deserialize;

use pulselink_adapter_ble::BleConfig;
use pulselink_adapter_virtual::SimulatorConfig;
use pulselink_app::config::LinkConfig;
use pulselink_domain::classification::DeviceClassification;
use pulselink_domain::permission::{Capability, Platform};

use crate::grants::parse_capability;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which radio implementation to drive.
    pub backend: Backend,
    /// Protocol family to auto-connect to.
    pub target: ScanTarget,
    /// Host platform, for the permission policy.
    pub platform: Platform,
    /// Capabilities the host has granted this process.
    pub granted: Vec<Capability>,
    /// Scan, polling and recovery timings.
    pub link: LinkConfig,
    /// btleplug adapter settings.
    pub ble: BleConfig,
    /// Simulated devices for the `simulated` backend.
    pub simulator: SimulatorConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Radio backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Host Bluetooth adapter through btleplug.
    #[default]
    Ble,
    /// Virtual oximeters, no hardware needed.
    Simulated,
}

impl Backend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ble" => Some(Self::Ble),
            "simulated" | "sim" | "virtual" => Some(Self::Simulated),
            _ => None,
        }
    }
}

/// Which devices the daemon is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanTarget {
    /// Every supported family.
    #[default]
    Any,
    VariableFrame,
    FixedFrame,
}

impl ScanTarget {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" => Some(Self::Any),
            "variable-frame" => Some(Self::VariableFrame),
            "fixed-frame" => Some(Self::FixedFrame),
            _ => None,
        }
    }

    /// Scan filter for this target, `None` for any known family.
    #[must_use]
    pub fn classification(self) -> Option<DeviceClassification> {
        match self {
            Self::Any => None,
            Self::VariableFrame => Some(DeviceClassification::VariableFrame),
            Self::FixedFrame => Some(DeviceClassification::FixedFrame),
        }
    }
}

/// Parse `apple`, `desktop` or `android:<api level>`.
fn parse_platform(value: &str) -> Option<Platform> {
    let value = value.trim().to_ascii_lowercase();
    match value.split_once(':') {
        Some(("android", level)) => level
            .parse()
            .ok()
            .map(|api_level| Platform::Android { api_level }),
        None if value == "apple" => Some(Platform::Apple),
        None if value == "desktop" => Some(Platform::Desktop),
        _ => None,
    }
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "pulselinkd=info,pulselink_app=info,pulselink_adapter_ble=info,pulselink_adapter_virtual=info"
                .to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `pulselink.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, an override
    /// cannot be parsed, or the result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("pulselink.toml")?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = var("PULSELINK_BACKEND") {
            self.backend = Backend::parse(&val).ok_or_else(|| invalid("PULSELINK_BACKEND", &val))?;
        }
        if let Some(val) = var("PULSELINK_TARGET") {
            self.target = ScanTarget::parse(&val).ok_or_else(|| invalid("PULSELINK_TARGET", &val))?;
        }
        if let Some(val) = var("PULSELINK_PLATFORM") {
            self.platform = parse_platform(&val).ok_or_else(|| invalid("PULSELINK_PLATFORM", &val))?;
        }
        if let Some(val) = var("PULSELINK_GRANTED") {
            self.granted = val
                .split(',')
                .filter(|item| !item.trim().is_empty())
                .map(|item| parse_capability(item).ok_or_else(|| invalid("PULSELINK_GRANTED", item)))
                .collect::<Result<_, _>>()?;
        }
        if let Some(val) = var("PULSELINK_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.link.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "link.event_capacity must be non-zero".to_string(),
            ));
        }
        if self.link.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "link.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.link.scan_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "link.scan_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.backend == Backend::Ble {
            if self.ble.event_buffer == 0 {
                return Err(ConfigError::Validation(
                    "ble.event_buffer must be non-zero".to_string(),
                ));
            }
            if self.ble.notification_buffer == 0 {
                return Err(ConfigError::Validation(
                    "ble.notification_buffer must be non-zero".to_string(),
                ));
            }
        }
        if self.backend == Backend::Simulated {
            if self.simulator.devices.is_empty() {
                return Err(ConfigError::Validation(
                    "simulator.devices must not be empty".to_string(),
                ));
            }
            if self.simulator.stream_interval_ms == 0 {
                return Err(ConfigError::Validation(
                    "simulator.stream_interval_ms must be non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Validation(format!("{key}: unrecognized value {value:?}"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.backend, Backend::Ble);
        assert_eq!(config.target, ScanTarget::Any);
        assert_eq!(config.platform, Platform::Desktop);
        assert_eq!(config.link.scan_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.link.poll_interval_ms, 1_000);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            backend = 'simulated'
            target = 'fixed-frame'
            granted = ['bluetooth_scan', 'bluetooth_connect']

            [platform]
            family = 'android'
            api_level = 33

            [link]
            max_recovery_attempts = 5

            [ble]
            adapter_index = 1

            [simulator]
            fragment_notifications = true

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.backend, Backend::Simulated);
        assert_eq!(config.target, ScanTarget::FixedFrame);
        assert_eq!(config.platform, Platform::Android { api_level: 33 });
        assert_eq!(
            config.granted,
            vec![Capability::BluetoothScan, Capability::BluetoothConnect]
        );
        assert_eq!(config.link.max_recovery_attempts, 5);
        assert_eq!(config.link.recovery_base_delay_ms, 2_000);
        assert_eq!(config.ble.adapter_index, 1);
        assert!(config.simulator.fragment_notifications);
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.backend, Backend::Ble);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_apply_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                ("PULSELINK_BACKEND", "simulated"),
                ("PULSELINK_TARGET", "variable-frame"),
                ("PULSELINK_PLATFORM", "android:30"),
                ("PULSELINK_LOG", "trace"),
            ]))
            .unwrap();
        assert_eq!(config.backend, Backend::Simulated);
        assert_eq!(config.target, ScanTarget::VariableFrame);
        assert_eq!(config.platform, Platform::Android { api_level: 30 });
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_prefer_rust_log_over_pulselink_log() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[("PULSELINK_LOG", "trace"), ("RUST_LOG", "warn")]))
            .unwrap();
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn should_reject_unknown_backend_override() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(env(&[("PULSELINK_BACKEND", "zigbee")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("PULSELINK_BACKEND")));
    }

    #[test]
    fn should_read_granted_capabilities_from_env() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[("PULSELINK_GRANTED", "fine_location, bluetooth_scan")]))
            .unwrap();
        assert_eq!(
            config.granted,
            vec![Capability::FineLocation, Capability::BluetoothScan]
        );

        let err = config
            .apply_env_overrides(env(&[("PULSELINK_GRANTED", "bluetooth_scan,camera")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("PULSELINK_GRANTED")));
    }

    #[test]
    fn should_parse_platforms() {
        assert_eq!(parse_platform("Apple"), Some(Platform::Apple));
        assert_eq!(parse_platform("desktop"), Some(Platform::Desktop));
        assert_eq!(
            parse_platform("android:31"),
            Some(Platform::Android { api_level: 31 })
        );
        assert_eq!(parse_platform("android:x"), None);
        assert_eq!(parse_platform("beos"), None);
    }

    #[test]
    fn should_map_target_to_scan_filter() {
        assert_eq!(ScanTarget::Any.classification(), None);
        assert_eq!(
            ScanTarget::FixedFrame.classification(),
            Some(DeviceClassification::FixedFrame)
        );
    }

    #[test]
    fn should_reject_zero_event_capacity() {
        let mut config = Config::default();
        config.link.event_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_poll_interval() {
        let mut config = Config::default();
        config.link.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_ble_buffers_only_for_ble_backend() {
        let mut config = Config::default();
        config.ble.event_buffer = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("ble.event_buffer")));

        config.ble.event_buffer = 128;
        config.ble.notification_buffer = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(msg) if msg.contains("ble.notification_buffer"))
        );

        config.backend = Backend::Simulated;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_reject_empty_simulator_only_for_simulated_backend() {
        let mut config = Config::default();
        config.simulator.devices.clear();
        assert!(config.validate().is_ok());
        config.backend = Backend::Simulated;
        assert!(config.validate().is_err());
    }
}
