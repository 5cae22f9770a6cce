//! [`Radio`] implementation over a btleplug adapter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use btleplug::api::{Central as _, CentralState, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use pulselink_app::ports::{Radio, RadioError, RadioEvent, RadioFactory};
use pulselink_domain::id::DeviceId;

use crate::config::BleConfig;
use crate::error::BleError;
use crate::events::{self, PeripheralCache};
use crate::gatt;

/// One handle on a host Bluetooth adapter.
pub struct BtleplugRadio {
    adapter: Adapter,
    peripherals: PeripheralCache,
    events: broadcast::Sender<RadioEvent>,
    pump: JoinHandle<()>,
    notification_buffer: usize,
}

impl BtleplugRadio {
    /// Open the configured adapter and start translating its events.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::NotAvailable`] when the adapter index does not
    /// exist, or the btleplug error raised while opening it.
    pub async fn open(config: &BleConfig) -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleError::NotAvailable)?;
        if let Ok(info) = adapter.adapter_info().await {
            tracing::info!(adapter = %info, "opened BLE adapter");
        }

        let stream = adapter.events().await?;
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let peripherals: PeripheralCache = Arc::new(Mutex::new(HashMap::new()));
        let pump = tokio::spawn(events::pump(
            adapter.clone(),
            stream,
            events.clone(),
            Arc::clone(&peripherals),
        ));

        Ok(Self {
            adapter,
            peripherals,
            events,
            pump,
            notification_buffer: config.notification_buffer.max(1),
        })
    }

    /// Resolve a device id to a peripheral, asking the adapter if the
    /// event pump has not cached it yet.
    async fn peripheral(&self, id: &DeviceId) -> Result<Peripheral, BleError> {
        let cached = self
            .peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        if let Some(peripheral) = cached {
            return Ok(peripheral);
        }
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| events::device_id(&p.id()) == *id)
            .ok_or_else(|| BleError::UnknownPeripheral(id.clone()))
    }

    async fn try_connect(&self, id: &DeviceId) -> Result<(), BleError> {
        let peripheral = self.peripheral(id).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(())
    }

    async fn try_discover(&self, id: &DeviceId) -> Result<Vec<uuid::Uuid>, BleError> {
        let peripheral = self.peripheral(id).await?;
        peripheral.discover_services().await?;
        Ok(peripheral.characteristics().into_iter().map(|c| c.uuid).collect())
    }

    async fn try_write(
        &self,
        id: &DeviceId,
        characteristic: uuid::Uuid,
        data: &[u8],
    ) -> Result<(), BleError> {
        let peripheral = self.peripheral(id).await?;
        let characteristic = gatt::find_characteristic(&peripheral, characteristic)?;
        peripheral
            .write(&characteristic, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn try_disconnect(&self, id: &DeviceId) -> Result<(), BleError> {
        let Ok(peripheral) = self.peripheral(id).await else {
            return Ok(());
        };
        if peripheral.is_connected().await? {
            peripheral.disconnect().await?;
        }
        Ok(())
    }
}

impl Drop for BtleplugRadio {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl Radio for BtleplugRadio {
    async fn is_powered_on(&self) -> Result<bool, RadioError> {
        let state = self
            .adapter
            .adapter_state()
            .await
            .map_err(BleError::from)?;
        // Some backends cannot report power; only an explicit "off" blocks.
        Ok(state != CentralState::PoweredOff)
    }

    fn events(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }

    async fn start_scan(&self) -> Result<(), RadioError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(BleError::from)?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.adapter.stop_scan().await.map_err(BleError::from)?;
        Ok(())
    }

    async fn connect(&self, id: &DeviceId) -> Result<(), RadioError> {
        Ok(self.try_connect(id).await?)
    }

    async fn discover_characteristics(
        &self,
        id: &DeviceId,
    ) -> Result<Vec<uuid::Uuid>, RadioError> {
        Ok(self.try_discover(id).await?)
    }

    async fn subscribe(
        &self,
        id: &DeviceId,
        characteristic: uuid::Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, RadioError> {
        let peripheral = self.peripheral(id).await?;
        Ok(gatt::forward_notifications(&peripheral, characteristic, self.notification_buffer).await?)
    }

    async fn write(
        &self,
        id: &DeviceId,
        characteristic: uuid::Uuid,
        data: &[u8],
    ) -> Result<(), RadioError> {
        Ok(self.try_write(id, characteristic, data).await?)
    }

    async fn disconnect(&self, id: &DeviceId) -> Result<(), RadioError> {
        Ok(self.try_disconnect(id).await?)
    }
}

/// Opens a [`BtleplugRadio`] each time the coordinator needs one.
#[derive(Debug, Clone, Default)]
pub struct BtleplugFactory {
    config: BleConfig,
}

impl BtleplugFactory {
    #[must_use]
    pub fn new(config: BleConfig) -> Self {
        Self { config }
    }
}

impl RadioFactory for BtleplugFactory {
    type Radio = BtleplugRadio;

    async fn create(&self) -> Result<BtleplugRadio, RadioError> {
        Ok(BtleplugRadio::open(&self.config).await?)
    }
}
