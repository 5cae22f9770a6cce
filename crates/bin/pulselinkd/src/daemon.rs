//! Event loop: scan, connect to the first matching device, log readings.

use pulselink_app::error::LinkError;
use pulselink_app::ports::{CapabilityProvider, RadioFactory};
use pulselink_app::services::connection_manager::DisconnectTarget;
use pulselink_app::services::coordinator::{Coordinator, RadioGuard};
use pulselink_domain::classification::DeviceClassification;
use pulselink_domain::connection::{ConnectionState, ConnectionStatus};
use pulselink_domain::device::DiscoveredDevice;
use pulselink_domain::event::LinkEvent;
use pulselink_domain::id::DeviceId;
use pulselink_domain::reading::NormalizedReading;

pub struct Daemon<F: RadioFactory, C: CapabilityProvider> {
    coordinator: Coordinator<F, C>,
    target: Option<DeviceClassification>,
    active: Option<DeviceId>,
}

impl<F: RadioFactory, C: CapabilityProvider> Daemon<F, C> {
    pub fn new(
        coordinator: Coordinator<F, C>,
        target: Option<DeviceClassification>,
    ) -> Self {
        Self {
            coordinator,
            target,
            active: None,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<F, C> {
        &self.coordinator
    }

    /// Device the daemon is currently attached to.
    pub fn active(&self) -> Option<&DeviceId> {
        self.active.as_ref()
    }

    /// Take the radio and begin looking for a device.
    pub async fn start(&mut self) -> Result<RadioGuard<F, C>, LinkError> {
        let guard = self.coordinator.acquire().await?;
        self.scan().await?;
        Ok(guard)
    }

    async fn scan(&self) -> Result<(), LinkError> {
        tracing::info!(
            target_family = self.target.map_or("any", DeviceClassification::as_str),
            "scanning for oximeters"
        );
        self.coordinator.start_scan(self.target).await
    }

    pub async fn handle(&mut self, event: LinkEvent) -> Result<(), LinkError> {
        match event {
            LinkEvent::DeviceFound(device) => self.on_device_found(device).await,
            LinkEvent::ReadingReceived(reading) => {
                log_reading(&reading);
                Ok(())
            }
            LinkEvent::ConnectionStatusChanged(status) => self.on_status(status).await,
        }
    }

    async fn on_device_found(&mut self, device: DiscoveredDevice) -> Result<(), LinkError> {
        if self.active.is_some() {
            return Ok(());
        }
        let id = device.descriptor.id.clone();
        tracing::info!(
            device_id = %id,
            name = device.descriptor.label(),
            family = device.classification.as_str(),
            "found oximeter, connecting"
        );
        self.coordinator.stop_scan().await?;
        match self.coordinator.connect_to_device(device.descriptor).await {
            Ok(()) => {
                self.active = Some(id);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(device_id = %id, error = %err, "connection failed, resuming scan");
                self.scan().await
            }
        }
    }

    async fn on_status(&mut self, status: ConnectionStatus) -> Result<(), LinkError> {
        tracing::info!(
            device_id = %status.device_id,
            state = %status.state,
            reason = ?status.reason,
            "connection status changed"
        );
        let ours = self.active.as_ref() == Some(&status.device_id);
        let gone = matches!(
            status.state,
            ConnectionState::Failed | ConnectionState::Disconnected
        );
        if ours && gone {
            self.active = None;
            return self.scan().await;
        }
        Ok(())
    }

    /// Disconnect everything and give the radio back.
    pub async fn shutdown(self, guard: RadioGuard<F, C>) {
        if let Err(err) = self.coordinator.stop_scan().await {
            tracing::debug!(error = %err, "stop scan during shutdown");
        }
        if let Err(err) = self.coordinator.disconnect(DisconnectTarget::All).await {
            tracing::debug!(error = %err, "disconnect during shutdown");
        }
        guard.release().await;
        tracing::info!("pulselinkd stopped");
    }
}

fn log_reading(reading: &NormalizedReading) {
    match (reading.spo2(), reading.heart_rate()) {
        (Some(spo2), Some(heart_rate)) => tracing::info!(
            device_id = %reading.device_id,
            spo2,
            heart_rate,
            perfusion_index = ?reading.measurement.perfusion_index,
            battery = ?reading.measurement.battery_level,
            "reading"
        ),
        _ if !reading.is_finger_detected() => {
            tracing::info!(device_id = %reading.device_id, "no finger detected");
        }
        _ => tracing::debug!(device_id = %reading.device_id, "searching for pulse"),
    }
}

#[cfg(test)]
mod tests {
    use pulselink_adapter_virtual::{SimulatedFactory, SimulatorConfig};
    use pulselink_app::config::LinkConfig;
    use pulselink_domain::permission::{Capability, Platform};
    use tokio::sync::broadcast;

    use super::*;
    use crate::grants::DeclaredCapabilities;

    type SimDaemon = Daemon<SimulatedFactory, DeclaredCapabilities>;

    fn daemon_on(
        platform: Platform,
        granted: Vec<Capability>,
        target: Option<DeviceClassification>,
    ) -> (SimDaemon, SimulatedFactory) {
        let factory = SimulatedFactory::new(SimulatorConfig::default());
        let coordinator = Coordinator::new(
            factory.clone(),
            platform,
            DeclaredCapabilities::new(granted),
            LinkConfig::default(),
        );
        (Daemon::new(coordinator, target), factory)
    }

    fn daemon(target: Option<DeviceClassification>) -> (SimDaemon, SimulatedFactory) {
        daemon_on(Platform::Desktop, Vec::new(), target)
    }

    async fn pump_until<F: RadioFactory, C: CapabilityProvider>(
        daemon: &mut Daemon<F, C>,
        events: &mut broadcast::Receiver<LinkEvent>,
        done: impl Fn(&LinkEvent) -> bool,
    ) -> LinkEvent {
        loop {
            let event = events.recv().await.unwrap();
            daemon.handle(event.clone()).await.unwrap();
            if done(&event) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_connect_to_first_matching_device_and_receive_readings() {
        let (mut daemon, _factory) = daemon(Some(DeviceClassification::VariableFrame));
        let mut events = daemon.coordinator().subscribe();
        let guard = daemon.start().await.unwrap();

        let event = pump_until(&mut daemon, &mut events, |e| {
            matches!(e, LinkEvent::ReadingReceived(_))
        })
        .await;
        let LinkEvent::ReadingReceived(reading) = event else {
            unreachable!();
        };
        assert_eq!(reading.protocol, DeviceClassification::VariableFrame);
        assert_eq!(daemon.active(), Some(&DeviceId::new("sim-o2ring-01")));
        assert!(!daemon.coordinator().is_scanning().await);

        daemon.shutdown(guard).await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_refuse_to_scan_on_android_without_declared_grants() {
        let android = Platform::Android { api_level: 33 };
        let (mut daemon, _factory) = daemon_on(android, vec![Capability::BluetoothScan], None);

        let err = daemon.start().await.unwrap_err();

        assert!(matches!(
            err,
            LinkError::PermissionDenied { ref missing } if missing == &[Capability::BluetoothConnect]
        ));
        assert!(!daemon.coordinator().is_scanning().await);
    }

    #[tokio::test(start_paused = true)]
    async fn should_scan_on_android_once_grants_are_declared() {
        let android = Platform::Android { api_level: 33 };
        let granted = vec![Capability::BluetoothScan, Capability::BluetoothConnect];
        let (mut daemon, _factory) = daemon_on(android, granted, None);

        let _guard = daemon.start().await.unwrap();

        assert!(daemon.coordinator().is_scanning().await);
    }

    #[tokio::test(start_paused = true)]
    async fn should_resume_scanning_after_recovery_exhausted() {
        let (mut daemon, factory) = daemon(Some(DeviceClassification::FixedFrame));
        let mut events = daemon.coordinator().subscribe();
        let _guard = daemon.start().await.unwrap();
        pump_until(&mut daemon, &mut events, |e| {
            matches!(e, LinkEvent::ReadingReceived(_))
        })
        .await;

        let radio = factory.radio();
        radio.fail_next_connects(u32::MAX);
        radio.drop_link(&DeviceId::new("sim-berrymed-01"));
        pump_until(&mut daemon, &mut events, |e| {
            matches!(e, LinkEvent::ConnectionStatusChanged(s) if s.state == ConnectionState::Failed)
        })
        .await;

        assert_eq!(daemon.active(), None);
        assert!(daemon.coordinator().is_scanning().await);
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_further_devices_once_attached() {
        let (mut daemon, _factory) = daemon(None);
        let mut events = daemon.coordinator().subscribe();
        let _guard = daemon.start().await.unwrap();
        pump_until(&mut daemon, &mut events, |e| {
            matches!(e, LinkEvent::ConnectionStatusChanged(s) if s.is_connected())
        })
        .await;
        let first = daemon.active().cloned();

        let other = DiscoveredDevice::classify(
            pulselink_domain::device::DeviceDescriptor::new("late", Some("O2Ring late".into())),
        );
        daemon.handle(LinkEvent::DeviceFound(other)).await.unwrap();

        assert_eq!(daemon.active().cloned(), first);
        assert_eq!(daemon.coordinator().connections().await.len(), 1);
    }
}
