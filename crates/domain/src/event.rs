//! Link events — the single tagged stream consumers subscribe to.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionStatus;
use crate::device::DiscoveredDevice;
use crate::reading::NormalizedReading;

/// Everything the integration core tells the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LinkEvent {
    /// A device matching the scan target was discovered.
    DeviceFound(DiscoveredDevice),
    /// A decoded reading arrived from a connected device.
    ReadingReceived(NormalizedReading),
    /// A device's connection state changed.
    ConnectionStatusChanged(ConnectionStatus),
}
