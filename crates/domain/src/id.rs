//! Device identifier newtype.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a BLE peripheral as reported by the platform radio.
///
/// On Linux and Windows this is usually the MAC address, on Apple platforms a
/// per-host UUID. The core never interprets it — it is only compared, hashed
/// and handed back to the radio backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap a platform identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_raw_identifier() {
        let id = DeviceId::new("A4:C1:38:5B:0E:DF");
        assert_eq!(id.to_string(), "A4:C1:38:5B:0E:DF");
        assert_eq!(id.as_str(), "A4:C1:38:5B:0E:DF");
    }

    #[test]
    fn should_compare_equal_when_built_from_str_or_string() {
        let a = DeviceId::from("peripheral-1");
        let b = DeviceId::from("peripheral-1".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn should_serialize_as_plain_string() {
        let id = DeviceId::new("peripheral-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"peripheral-1\"");
    }
}
