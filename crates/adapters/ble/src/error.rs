//! BLE adapter error types.

use pulselink_app::ports::RadioError;
use pulselink_domain::id::DeviceId;

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// A btleplug operation failed.
    #[error("BLE operation failed")]
    Btleplug(#[from] btleplug::Error),

    /// The peripheral was never seen by this adapter.
    #[error("unknown peripheral {0}")]
    UnknownPeripheral(DeviceId),

    /// A required characteristic is missing after service discovery.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound {
        /// UUID that was looked up.
        uuid: uuid::Uuid,
    },
}

impl From<BleError> for RadioError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::NotAvailable => Self::NotAvailable,
            BleError::UnknownPeripheral(id) => Self::DeviceNotFound(id),
            BleError::CharacteristicNotFound { uuid } => Self::CharacteristicNotFound(uuid),
            other @ BleError::Btleplug(_) => Self::backend(other),
        }
    }
}
