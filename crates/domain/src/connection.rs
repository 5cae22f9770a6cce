//! Connection lifecycle states and the status records published on changes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classification::DeviceClassification;
use crate::id::DeviceId;

/// Lifecycle state of one device connection.
///
/// ```text
/// Disconnected → Connecting → Connected → Disconnected   (explicit)
///                                       → Recovering → Connected
///                                                    → Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Link lost unexpectedly; a reconnect is scheduled.
    Recovering,
    /// Recovery attempts exhausted. Terminal.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Recovering => f.write_str("recovering"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Why a device is no longer connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum DisconnectReason {
    /// The caller asked for the disconnect.
    Requested,
    /// The radio dropped the link; recovery may follow.
    LinkLost,
    /// Every recovery attempt failed.
    RecoveryExhausted {
        /// Number of reconnects that were tried.
        attempts: u8,
    },
}

/// Published whenever a device's connection state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub device_id: DeviceId,
    pub classification: DeviceClassification,
    pub state: ConnectionState,
    /// Set for every transition away from [`ConnectionState::Connected`].
    pub reason: Option<DisconnectReason>,
}

impl ConnectionStatus {
    /// Status for a freshly established (or re-established) link.
    #[must_use]
    pub fn connected(device_id: DeviceId, classification: DeviceClassification) -> Self {
        Self {
            device_id,
            classification,
            state: ConnectionState::Connected,
            reason: None,
        }
    }

    /// Status for a link that went away in `state` because of `reason`.
    #[must_use]
    pub fn lost(
        device_id: DeviceId,
        classification: DeviceClassification,
        state: ConnectionState,
        reason: DisconnectReason,
    ) -> Self {
        Self {
            device_id,
            classification,
            state,
            reason: Some(reason),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_connected_only_in_connected_state() {
        let status = ConnectionStatus::connected(
            DeviceId::new("dev"),
            DeviceClassification::FixedFrame,
        );
        assert!(status.is_connected());
        assert_eq!(status.reason, None);

        let lost = ConnectionStatus::lost(
            DeviceId::new("dev"),
            DeviceClassification::FixedFrame,
            ConnectionState::Recovering,
            DisconnectReason::LinkLost,
        );
        assert!(!lost.is_connected());
    }

    #[test]
    fn should_default_to_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn should_serialize_exhaustion_reason_with_attempts() {
        let json = serde_json::to_value(DisconnectReason::RecoveryExhausted { attempts: 3 }).unwrap();
        assert_eq!(json["reason"], "recovery-exhausted");
        assert_eq!(json["attempts"], 3);
    }
}
