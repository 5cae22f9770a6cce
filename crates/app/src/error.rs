//! Errors returned by the service surface.

use pulselink_domain::id::DeviceId;
use pulselink_domain::permission::Capability;

use crate::ports::RadioError;

/// Failure of a scan or connect request.
///
/// Link loss and recovery exhaustion are not errors: they surface as
/// connection status events.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The host refused one or more required capabilities.
    #[error("bluetooth permissions denied: {missing:?}")]
    PermissionDenied { missing: Vec<Capability> },

    /// The adapter is powered off.
    #[error("bluetooth radio is powered off")]
    RadioDisabled,

    /// The device does not belong to a supported protocol family.
    #[error("device {device_id} is not a supported oximeter")]
    ClassificationUnknown { device_id: DeviceId },

    /// Connecting, discovering or subscribing failed after the retry.
    #[error("connection setup failed for {device_id}")]
    ConnectionSetupFailed {
        device_id: DeviceId,
        #[source]
        source: RadioError,
    },

    /// The device is already being connected or recovered.
    #[error("connection to {device_id} already in progress")]
    ConnectionInProgress { device_id: DeviceId },

    /// Raised after the coordinator tore its radio down under a caller.
    #[error("radio is not acquired")]
    NotAcquired,

    #[error(transparent)]
    Radio(#[from] RadioError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_setup_failure_with_device_id() {
        let err = LinkError::ConnectionSetupFailed {
            device_id: DeviceId::new("AA:BB"),
            source: RadioError::NotConnected(DeviceId::new("AA:BB")),
        };
        assert_eq!(err.to_string(), "connection setup failed for AA:BB");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "device AA:BB is not connected");
    }

    #[test]
    fn should_list_missing_capabilities() {
        let err = LinkError::PermissionDenied {
            missing: vec![Capability::BluetoothScan],
        };
        assert!(err.to_string().contains("BluetoothScan"));
    }
}
