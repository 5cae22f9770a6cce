//! Platform permission policy.
//!
//! Which runtime grants a host needs before it may scan and connect depends
//! on the platform family and, on Android, on the API level.

use serde::{Deserialize, Serialize};

/// First Android API level with dedicated runtime Bluetooth permissions.
pub const ANDROID_RUNTIME_BLUETOOTH_API: u32 = 31;

/// Host platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Platform {
    /// iOS / macOS: authorization is implicit, only radio power matters.
    Apple,
    /// Android, whose policy depends on the API level.
    Android {
        /// `Build.VERSION.SDK_INT` of the host.
        api_level: u32,
    },
    /// Linux / Windows hosts driven through the system Bluetooth stack.
    #[default]
    Desktop,
}

/// A runtime capability the host must grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    BluetoothScan,
    BluetoothConnect,
    /// Needed on older Android as a side effect of BLE scanning.
    FineLocation,
}

impl Platform {
    /// Capabilities that must all be granted before scanning.
    #[must_use]
    pub fn required_capabilities(self) -> &'static [Capability] {
        match self {
            Self::Apple | Self::Desktop => &[],
            Self::Android { api_level } if api_level >= ANDROID_RUNTIME_BLUETOOTH_API => {
                &[Capability::BluetoothScan, Capability::BluetoothConnect]
            }
            Self::Android { .. } => &[Capability::FineLocation],
        }
    }
}
