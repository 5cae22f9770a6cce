//! Central event pump — btleplug events to radio events.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use btleplug::api::{Central as _, CentralEvent, Peripheral as _, PeripheralProperties};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use tokio::sync::broadcast;
use tokio_stream::{Stream, StreamExt as _};

use pulselink_app::ports::RadioEvent;
use pulselink_domain::device::DeviceDescriptor;
use pulselink_domain::id::DeviceId;

/// Peripherals seen so far, by the id the rest of the system uses.
pub(crate) type PeripheralCache = Arc<Mutex<HashMap<DeviceId, Peripheral>>>;

pub(crate) fn device_id(id: &PeripheralId) -> DeviceId {
    DeviceId::new(id.to_string())
}

/// Map advertised properties to a descriptor.
pub(crate) fn descriptor_from(id: DeviceId, properties: &PeripheralProperties) -> DeviceDescriptor {
    let descriptor = DeviceDescriptor::new(id, properties.local_name.clone())
        .with_services(properties.services.iter().copied());
    match properties.rssi {
        Some(rssi) => descriptor.with_rssi(rssi),
        None => descriptor,
    }
}

pub(crate) async fn pump(
    adapter: Adapter,
    mut stream: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    events: broadcast::Sender<RadioEvent>,
    cache: PeripheralCache,
) {
    while let Some(event) = stream.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                let descriptor = descriptor_from(device_id(&id), &properties);
                tracing::trace!(
                    device_id = %descriptor.id,
                    name = ?descriptor.name,
                    rssi = ?descriptor.rssi,
                    "BLE advertisement"
                );
                cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(descriptor.id.clone(), peripheral);
                let _ = events.send(RadioEvent::Discovered(descriptor));
            }
            CentralEvent::DeviceDisconnected(id) => {
                let id = device_id(&id);
                tracing::debug!(device_id = %id, "BLE peripheral disconnected");
                let _ = events.send(RadioEvent::Disconnected(id));
            }
            _ => {}
        }
    }
    tracing::debug!("BLE central event stream ended");
}
