//! Device classification — mapping an advertisement to a vendor protocol family.
//!
//! Classification is a pure function of the descriptor: advertised service
//! UUIDs are checked first (they are unambiguous), then case-insensitive name
//! substrings. The same descriptor always yields the same family.
//!
//! | Family | Frames | Service UUID | Polling |
//! |--------|--------|--------------|---------|
//! | [`VariableFrame`](DeviceClassification::VariableFrame) | 8 / 13 / 20 bytes, CRC-8 commands | `14839ac4-…` | 1 Hz real-time request |
//! | [`FixedFrame`](DeviceClassification::FixedFrame) | 5 bytes, `0xAA` header | `49535343-…` (ISSC transparent UART) | none |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DeviceDescriptor;

/// GATT service exposed by variable-frame oximeters.
pub const VARIABLE_FRAME_SERVICE: uuid::Uuid =
    uuid::Uuid::from_u128(0x1483_9ac4_7d7e_415c_9a42_1673_40cf_2339);
/// Notify characteristic carrying variable-frame payloads.
pub const VARIABLE_FRAME_NOTIFY: uuid::Uuid =
    uuid::Uuid::from_u128(0x0734_594a_a8e7_4b1a_a6b1_cd52_4305_9a57);
/// Write characteristic accepting variable-frame commands.
pub const VARIABLE_FRAME_WRITE: uuid::Uuid =
    uuid::Uuid::from_u128(0x8b00_ace7_eb0b_49b0_bbe9_9aee_0a26_e1a3);

/// GATT service exposed by fixed-frame oximeters.
pub const FIXED_FRAME_SERVICE: uuid::Uuid =
    uuid::Uuid::from_u128(0x4953_5343_fe7d_4ae5_8fa9_9faf_d205_e455);
/// Notify characteristic carrying fixed-frame payloads.
pub const FIXED_FRAME_NOTIFY: uuid::Uuid =
    uuid::Uuid::from_u128(0x4953_5343_1e4d_4bd9_ba61_23c6_4724_9616);

/// Upper-cased name fragments advertised by variable-frame devices.
const VARIABLE_FRAME_NAMES: &[&str] = &["O2RING", "WELLUE", "CHECKME", "OXYLINK", "BABYO2"];

/// Upper-cased name fragments advertised by fixed-frame devices.
const FIXED_FRAME_NAMES: &[&str] = &["BERRY", "BM1000", "BM2000"];

/// Vendor protocol family of a discovered peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClassification {
    /// Vendor A: variable-length frames, polled with CRC-8 command frames.
    VariableFrame,
    /// Vendor B: fixed 5-byte frames streamed without polling.
    FixedFrame,
    /// Not a supported oximeter.
    #[default]
    Unknown,
}

/// GATT endpoints and behaviour required to talk to one protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattProfile {
    /// Primary service advertised by the family.
    pub service: uuid::Uuid,
    /// Characteristic to subscribe to for measurement payloads.
    pub notify: uuid::Uuid,
    /// Characteristic receiving polling commands, for families that poll.
    pub write: Option<uuid::Uuid>,
}

impl GattProfile {
    /// Whether the connection must run a polling loop against [`write`](Self::write).
    #[must_use]
    pub fn requires_polling(&self) -> bool {
        self.write.is_some()
    }
}

const VARIABLE_FRAME_PROFILE: GattProfile = GattProfile {
    service: VARIABLE_FRAME_SERVICE,
    notify: VARIABLE_FRAME_NOTIFY,
    write: Some(VARIABLE_FRAME_WRITE),
};

const FIXED_FRAME_PROFILE: GattProfile = GattProfile {
    service: FIXED_FRAME_SERVICE,
    notify: FIXED_FRAME_NOTIFY,
    write: None,
};

impl DeviceClassification {
    /// Classify a descriptor from its advertised services and name.
    #[must_use]
    pub fn classify(descriptor: &DeviceDescriptor) -> Self {
        if descriptor.services.contains(&VARIABLE_FRAME_SERVICE) {
            return Self::VariableFrame;
        }
        if descriptor.services.contains(&FIXED_FRAME_SERVICE) {
            return Self::FixedFrame;
        }
        descriptor
            .name
            .as_deref()
            .map_or(Self::Unknown, Self::classify_name)
    }

    /// Classify from an advertised name alone.
    #[must_use]
    pub fn classify_name(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        if VARIABLE_FRAME_NAMES.iter().any(|p| upper.contains(p)) {
            Self::VariableFrame
        } else if FIXED_FRAME_NAMES.iter().any(|p| upper.contains(p)) {
            Self::FixedFrame
        } else {
            Self::Unknown
        }
    }

    /// Whether this is a supported protocol family.
    #[must_use]
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// GATT endpoints for the family, `None` for [`Unknown`](Self::Unknown).
    #[must_use]
    pub fn profile(self) -> Option<&'static GattProfile> {
        match self {
            Self::VariableFrame => Some(&VARIABLE_FRAME_PROFILE),
            Self::FixedFrame => Some(&FIXED_FRAME_PROFILE),
            Self::Unknown => None,
        }
    }

    /// Stable tag used in logs and on readings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VariableFrame => "variable-frame",
            Self::FixedFrame => "fixed-frame",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> DeviceDescriptor {
        DeviceDescriptor::new("AA:BB:CC:DD:EE:FF", Some(name.to_string()))
    }

    #[test]
    fn should_classify_variable_frame_by_name() {
        assert_eq!(
            DeviceClassification::classify(&named("O2Ring 2F1A")),
            DeviceClassification::VariableFrame
        );
        assert_eq!(
            DeviceClassification::classify(&named("Checkme O2")),
            DeviceClassification::VariableFrame
        );
    }

    #[test]
    fn should_classify_fixed_frame_by_name() {
        assert_eq!(
            DeviceClassification::classify(&named("BerryMed")),
            DeviceClassification::FixedFrame
        );
        assert_eq!(
            DeviceClassification::classify(&named("bm1000c")),
            DeviceClassification::FixedFrame
        );
    }

    #[test]
    fn should_classify_by_service_uuid_before_name() {
        let descriptor = named("Generic Oximeter").with_services([FIXED_FRAME_SERVICE]);
        assert_eq!(
            DeviceClassification::classify(&descriptor),
            DeviceClassification::FixedFrame
        );

        let descriptor = named("BerryMed").with_services([VARIABLE_FRAME_SERVICE]);
        assert_eq!(
            DeviceClassification::classify(&descriptor),
            DeviceClassification::VariableFrame
        );
    }

    #[test]
    fn should_return_unknown_for_unrelated_device() {
        assert_eq!(
            DeviceClassification::classify(&named("Mi Band 7")),
            DeviceClassification::Unknown
        );
        let unnamed = DeviceDescriptor::new("AA:BB", None);
        assert_eq!(
            DeviceClassification::classify(&unnamed),
            DeviceClassification::Unknown
        );
    }

    #[test]
    fn should_classify_deterministically() {
        let descriptor = named("Wellue O2Ring");
        let first = DeviceClassification::classify(&descriptor);
        for _ in 0..10 {
            assert_eq!(DeviceClassification::classify(&descriptor), first);
        }
    }

    #[test]
    fn should_expose_polling_profile_only_for_variable_frame() {
        let variable = DeviceClassification::VariableFrame.profile().unwrap();
        assert!(variable.requires_polling());
        assert_eq!(variable.notify, VARIABLE_FRAME_NOTIFY);

        let fixed = DeviceClassification::FixedFrame.profile().unwrap();
        assert!(!fixed.requires_polling());

        assert!(DeviceClassification::Unknown.profile().is_none());
    }

    #[test]
    fn should_serialize_as_kebab_case() {
        let json = serde_json::to_string(&DeviceClassification::VariableFrame).unwrap();
        assert_eq!(json, "\"variable-frame\"");
        let back: DeviceClassification = serde_json::from_str("\"fixed-frame\"").unwrap();
        assert_eq!(back, DeviceClassification::FixedFrame);
    }
}
