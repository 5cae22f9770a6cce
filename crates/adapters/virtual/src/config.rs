//! Simulator configuration.

use serde::Deserialize;

use pulselink_domain::classification::DeviceClassification;

/// One simulated oximeter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulatedDeviceConfig {
    /// Identifier the radio reports for the device.
    pub id: String,
    /// Advertised local name.
    pub name: String,
    /// Wire protocol the device speaks.
    pub family: DeviceClassification,
    /// Baseline SpO2, percent.
    #[serde(default = "default_spo2")]
    pub spo2: u8,
    /// Baseline pulse, bpm.
    #[serde(default = "default_heart_rate")]
    pub heart_rate: u8,
    /// Reported battery level, percent.
    #[serde(default = "default_battery")]
    pub battery: u8,
}

fn default_spo2() -> u8 {
    97
}

fn default_heart_rate() -> u8 {
    68
}

fn default_battery() -> u8 {
    90
}

/// Configuration for the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub devices: Vec<SimulatedDeviceConfig>,
    /// Interval between advertisements of every device while scanning.
    pub advertise_interval_ms: u64,
    /// Interval between frames streamed by fixed-frame devices.
    pub stream_interval_ms: u64,
    /// Deliver fixed-frame frames one byte per notification.
    pub fragment_notifications: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            devices: vec![
                SimulatedDeviceConfig {
                    id: "sim-berrymed-01".to_string(),
                    name: "BerryMed BM1000".to_string(),
                    family: DeviceClassification::FixedFrame,
                    spo2: default_spo2(),
                    heart_rate: default_heart_rate(),
                    battery: default_battery(),
                },
                SimulatedDeviceConfig {
                    id: "sim-o2ring-01".to_string(),
                    name: "O2Ring 0421".to_string(),
                    family: DeviceClassification::VariableFrame,
                    spo2: 95,
                    heart_rate: 74,
                    battery: 64,
                },
            ],
            advertise_interval_ms: 500,
            stream_interval_ms: 1_000,
            fragment_notifications: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_simulate_both_families_by_default() {
        let config = SimulatorConfig::default();
        let families: Vec<_> = config.devices.iter().map(|d| d.family).collect();
        assert!(families.contains(&DeviceClassification::FixedFrame));
        assert!(families.contains(&DeviceClassification::VariableFrame));
    }

    #[test]
    fn should_parse_devices_from_toml() {
        let config: SimulatorConfig = toml::from_str(
            r#"
            stream_interval_ms = 250

            [[devices]]
            id = "ring"
            name = "Wellue O2Ring"
            family = "variable-frame"
            spo2 = 92
            "#,
        )
        .unwrap();
        assert_eq!(config.stream_interval_ms, 250);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].family, DeviceClassification::VariableFrame);
        assert_eq!(config.devices[0].spo2, 92);
        assert_eq!(config.devices[0].heart_rate, 68);
        assert_eq!(config.advertise_interval_ms, 500);
    }
}
