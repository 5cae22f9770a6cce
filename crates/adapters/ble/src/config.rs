//! BLE adapter configuration.

use serde::Deserialize;

/// Configuration for the btleplug radio.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Which host adapter to use when several are present.
    pub adapter_index: usize,
    /// Notifications buffered per subscription before backpressure.
    pub notification_buffer: usize,
    /// Capacity of the radio event broadcast channel.
    pub event_buffer: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            notification_buffer: 64,
            event_buffer: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_use_first_adapter_by_default() {
        let config = BleConfig::default();
        assert_eq!(config.adapter_index, 0);
        assert_eq!(config.notification_buffer, 64);
    }

    #[test]
    fn should_parse_partial_toml() {
        let config: BleConfig = toml::from_str("adapter_index = 1").unwrap();
        assert_eq!(config.adapter_index, 1);
        assert_eq!(config.event_buffer, 128);
    }
}
