//! Device descriptors — what the radio tells us about an advertising peripheral.

use serde::{Deserialize, Serialize};

use crate::classification::DeviceClassification;
use crate::id::DeviceId;

/// Snapshot of a peripheral's advertisement at discovery time.
///
/// Descriptors are immutable once discovered: the scanner keeps the first
/// descriptor it sees for an id during a scan session and ignores later
/// advertisements from the same peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Platform identifier used to address the peripheral.
    pub id: DeviceId,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Advertised primary service UUIDs.
    pub services: Vec<uuid::Uuid>,
    /// Received signal strength in dBm.
    pub rssi: Option<i16>,
}

impl DeviceDescriptor {
    /// Create a descriptor with no advertised services and unknown RSSI.
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            services: Vec::new(),
            rssi: None,
        }
    }

    /// Attach advertised service UUIDs.
    #[must_use]
    pub fn with_services(mut self, services: impl IntoIterator<Item = uuid::Uuid>) -> Self {
        self.services = services.into_iter().collect();
        self
    }

    /// Attach the received signal strength.
    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Human-readable label: the advertised name, falling back to the id.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// A descriptor paired with the protocol family it was classified into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub descriptor: DeviceDescriptor,
    pub classification: DeviceClassification,
}

impl DiscoveredDevice {
    /// Classify `descriptor` and pair it with the result.
    #[must_use]
    pub fn classify(descriptor: DeviceDescriptor) -> Self {
        let classification = DeviceClassification::classify(&descriptor);
        Self {
            descriptor,
            classification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_fall_back_to_id_when_name_missing() {
        let descriptor = DeviceDescriptor::new("AA:BB:CC:DD:EE:FF", None);
        assert_eq!(descriptor.label(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn should_prefer_advertised_name_as_label() {
        let descriptor = DeviceDescriptor::new("AA:BB", Some("O2Ring 1234".to_string()));
        assert_eq!(descriptor.label(), "O2Ring 1234");
    }

    #[test]
    fn should_carry_services_and_rssi() {
        let uuid = uuid::Uuid::from_u128(1);
        let descriptor = DeviceDescriptor::new("AA:BB", None)
            .with_services([uuid])
            .with_rssi(-61);
        assert_eq!(descriptor.services, vec![uuid]);
        assert_eq!(descriptor.rssi, Some(-61));
    }

    #[test]
    fn should_classify_when_building_discovered_device() {
        let descriptor = DeviceDescriptor::new("AA:BB", Some("BerryMed".to_string()));
        let discovered = DiscoveredDevice::classify(descriptor);
        assert_eq!(discovered.classification, DeviceClassification::FixedFrame);
    }
}
