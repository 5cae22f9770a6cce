//! Capability grants declared by the operator.
//!
//! A daemon has no permission prompt to show, so whatever the host granted
//! is listed in configuration and checked against the platform's
//! requirements. Apple and desktop hosts require nothing.

use pulselink_app::ports::CapabilityProvider;
use pulselink_domain::permission::Capability;

/// Grants exactly the configured capabilities.
#[derive(Debug, Clone, Default)]
pub struct DeclaredCapabilities {
    granted: Vec<Capability>,
}

impl DeclaredCapabilities {
    pub fn new(granted: Vec<Capability>) -> Self {
        Self { granted }
    }
}

impl CapabilityProvider for DeclaredCapabilities {
    async fn request(&self, capability: Capability) -> bool {
        let granted = self.granted.contains(&capability);
        if !granted {
            tracing::debug!(?capability, "capability not listed in `granted`");
        }
        granted
    }
}

/// Parse `bluetooth_scan`, `bluetooth_connect` or `fine_location`.
pub(crate) fn parse_capability(value: &str) -> Option<Capability> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "bluetooth_scan" => Some(Capability::BluetoothScan),
        "bluetooth_connect" => Some(Capability::BluetoothConnect),
        "fine_location" => Some(Capability::FineLocation),
        _ => None,
    }
}
