//! Radio port — the BLE central operations the services need.
//!
//! A [`Radio`] is one handle on the host's Bluetooth adapter. The
//! [`Coordinator`](crate::services::coordinator::Coordinator) owns at most one
//! at a time and creates it lazily through a [`RadioFactory`].

use std::future::Future;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use pulselink_domain::device::DeviceDescriptor;
use pulselink_domain::id::DeviceId;

/// Errors reported by radio backends.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    /// No Bluetooth adapter is present or it could not be opened.
    #[error("bluetooth adapter not available")]
    NotAvailable,

    /// The backend has never seen a peripheral with this id.
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// A required characteristic is missing from the peripheral.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// The operation needs an established link.
    #[error("device {0} is not connected")]
    NotConnected(DeviceId),

    /// Backend-specific failure.
    #[error("radio backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RadioError {
    /// Wrap an arbitrary backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Unsolicited events raised by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// An advertisement was received while scanning.
    Discovered(DeviceDescriptor),
    /// A link dropped without being asked to.
    Disconnected(DeviceId),
}

/// BLE central operations.
///
/// Implementations must be cheap to share behind an `Arc`; every method takes
/// `&self`.
pub trait Radio: Send + Sync + 'static {
    /// Whether the adapter is powered on.
    fn is_powered_on(&self) -> impl Future<Output = Result<bool, RadioError>> + Send;

    /// Subscribe to unsolicited radio events.
    ///
    /// Events raised before the call are not replayed.
    fn events(&self) -> broadcast::Receiver<RadioEvent>;

    /// Start an unfiltered scan; results arrive as [`RadioEvent::Discovered`].
    fn start_scan(&self) -> impl Future<Output = Result<(), RadioError>> + Send;

    fn stop_scan(&self) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// Establish a link with a previously discovered peripheral.
    fn connect(&self, id: &DeviceId) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// Discover services and return every characteristic UUID found.
    fn discover_characteristics(
        &self,
        id: &DeviceId,
    ) -> impl Future<Output = Result<Vec<Uuid>, RadioError>> + Send;

    /// Enable notifications on `characteristic`.
    ///
    /// The returned channel yields one item per notification and closes when
    /// the link goes away.
    fn subscribe(
        &self,
        id: &DeviceId,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<mpsc::Receiver<Vec<u8>>, RadioError>> + Send;

    /// Write `data` to `characteristic` without response.
    fn write(
        &self,
        id: &DeviceId,
        characteristic: Uuid,
        data: &[u8],
    ) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// Tear the link down. Disconnecting an unknown or idle device is not an error.
    fn disconnect(&self, id: &DeviceId) -> impl Future<Output = Result<(), RadioError>> + Send;
}

/// Creates radio handles on demand.
pub trait RadioFactory: Send + Sync + 'static {
    type Radio: Radio;

    /// Open a new handle on the Bluetooth adapter.
    fn create(&self) -> impl Future<Output = Result<Self::Radio, RadioError>> + Send;
}
