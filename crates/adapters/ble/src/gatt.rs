//! GATT helpers for connected peripherals.

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;

use crate::error::BleError;

/// Find a GATT characteristic by UUID on a peripheral that has already
/// discovered its services.
///
/// # Errors
///
/// Returns [`BleError::CharacteristicNotFound`] if no characteristic with
/// the given UUID is present.
pub(crate) fn find_characteristic(
    peripheral: &Peripheral,
    uuid: uuid::Uuid,
) -> Result<Characteristic, BleError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or(BleError::CharacteristicNotFound { uuid })
}

/// Enable notifications on `uuid` and forward their values into a channel.
///
/// The forwarding task ends when the peripheral's notification stream ends
/// or the receiver is dropped.
pub(crate) async fn forward_notifications(
    peripheral: &Peripheral,
    uuid: uuid::Uuid,
    buffer: usize,
) -> Result<mpsc::Receiver<Vec<u8>>, BleError> {
    let characteristic = find_characteristic(peripheral, uuid)?;
    let mut stream = peripheral.notifications().await?;
    peripheral.subscribe(&characteristic).await?;

    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(async move {
        while let Some(notification) = stream.next().await {
            if notification.uuid != uuid {
                continue;
            }
            if tx.send(notification.value).await.is_err() {
                break;
            }
        }
        tracing::debug!(%uuid, "notification forwarding ended");
    });
    Ok(rx)
}
