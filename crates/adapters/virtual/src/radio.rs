//! [`Radio`] implementation backed by simulated oximeters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use pulselink_app::ports::{Radio, RadioError, RadioEvent, RadioFactory};
use pulselink_domain::classification::DeviceClassification;
use pulselink_domain::id::DeviceId;

use crate::config::SimulatorConfig;
use crate::devices::SimulatedOximeter;

const NOTIFICATION_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 128;

/// Failures injected by the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error("simulated connection failure")]
    InjectedFailure,
}

#[derive(Default)]
struct Link {
    notifier: Option<mpsc::Sender<Vec<u8>>>,
    streamer: Option<JoinHandle<()>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(streamer) = self.streamer.take() {
            streamer.abort();
        }
    }
}

#[derive(Default)]
struct State {
    devices: HashMap<DeviceId, SimulatedOximeter>,
    links: HashMap<DeviceId, Link>,
    advertiser: Option<JoinHandle<()>>,
}

struct Inner {
    config: SimulatorConfig,
    powered: AtomicBool,
    failing_connects: AtomicU32,
    events: broadcast::Sender<RadioEvent>,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A simulated Bluetooth adapter.
///
/// Clones share the same simulated world, so a test can keep a handle to
/// script link loss while the services drive another.
#[derive(Clone)]
pub struct SimulatedRadio {
    inner: Arc<Inner>,
}

impl SimulatedRadio {
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let devices = config
            .devices
            .iter()
            .cloned()
            .map(SimulatedOximeter::new)
            .map(|device| (device.id(), device))
            .collect();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                config,
                powered: AtomicBool::new(true),
                failing_connects: AtomicU32::new(0),
                events,
                state: Mutex::new(State {
                    devices,
                    ..State::default()
                }),
            }),
        }
    }

    /// Switch the simulated adapter on or off. Turning it off drops every
    /// link and reports each one as lost.
    pub fn set_powered(&self, on: bool) {
        self.inner.powered.store(on, Ordering::SeqCst);
        if on {
            return;
        }
        let dropped: Vec<DeviceId> = {
            let mut state = self.inner.state();
            if let Some(advertiser) = state.advertiser.take() {
                advertiser.abort();
            }
            state.links.drain().map(|(id, _)| id).collect()
        };
        tracing::info!(links = dropped.len(), "simulated radio powered off");
        for id in dropped {
            let _ = self.inner.events.send(RadioEvent::Disconnected(id));
        }
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.inner.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Simulate the device walking out of range. Returns `false` when the
    /// device was not connected.
    pub fn drop_link(&self, id: &DeviceId) -> bool {
        let removed = self.inner.state().links.remove(id).is_some();
        if removed {
            tracing::info!(device_id = %id, "simulated link loss");
            let _ = self.inner.events.send(RadioEvent::Disconnected(id.clone()));
        }
        removed
    }

    /// Whether a host link to `id` is currently established.
    #[must_use]
    pub fn is_connected(&self, id: &DeviceId) -> bool {
        self.inner.state().links.contains_key(id)
    }

    fn ensure_powered(&self) -> Result<(), RadioError> {
        if self.inner.powered.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RadioError::NotAvailable)
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn characteristics(&self, id: &DeviceId) -> Result<Vec<uuid::Uuid>, RadioError> {
        let state = self.inner.state();
        if !state.links.contains_key(id) {
            return Err(RadioError::NotConnected(id.clone()));
        }
        state
            .devices
            .get(id)
            .map(SimulatedOximeter::characteristics)
            .ok_or_else(|| RadioError::DeviceNotFound(id.clone()))
    }
}

impl Radio for SimulatedRadio {
    async fn is_powered_on(&self) -> Result<bool, RadioError> {
        Ok(self.inner.powered.load(Ordering::SeqCst))
    }

    fn events(&self) -> broadcast::Receiver<RadioEvent> {
        self.inner.events.subscribe()
    }

    async fn start_scan(&self) -> Result<(), RadioError> {
        self.ensure_powered()?;
        let interval = Duration::from_millis(self.inner.config.advertise_interval_ms);
        let advertiser = tokio::spawn(advertise(Arc::downgrade(&self.inner), interval));
        if let Some(previous) = self.inner.state().advertiser.replace(advertiser) {
            previous.abort();
        }
        tracing::debug!("simulated scan started");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        if let Some(advertiser) = self.inner.state().advertiser.take() {
            advertiser.abort();
            tracing::debug!("simulated scan stopped");
        }
        Ok(())
    }

    async fn connect(&self, id: &DeviceId) -> Result<(), RadioError> {
        self.ensure_powered()?;
        if self.take_injected_failure() {
            tracing::debug!(device_id = %id, "injecting connection failure");
            return Err(RadioError::backend(SimulatorError::InjectedFailure));
        }
        let mut state = self.inner.state();
        if !state.devices.contains_key(id) {
            return Err(RadioError::DeviceNotFound(id.clone()));
        }
        state.links.entry(id.clone()).or_default();
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        id: &DeviceId,
    ) -> Result<Vec<uuid::Uuid>, RadioError> {
        self.characteristics(id)
    }

    async fn subscribe(
        &self,
        id: &DeviceId,
        characteristic: uuid::Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, RadioError> {
        if !self.characteristics(id)?.contains(&characteristic) {
            return Err(RadioError::CharacteristicNotFound(characteristic));
        }
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let mut state = self.inner.state();
        let streams = state
            .devices
            .get(id)
            .is_some_and(|device| device.family() == DeviceClassification::FixedFrame);
        let Some(link) = state.links.get_mut(id) else {
            return Err(RadioError::NotConnected(id.clone()));
        };
        if let Some(previous) = link.streamer.take() {
            previous.abort();
        }
        if streams {
            link.streamer = Some(tokio::spawn(stream_frames(
                Arc::downgrade(&self.inner),
                id.clone(),
                tx.clone(),
            )));
        }
        link.notifier = Some(tx);
        Ok(rx)
    }

    async fn write(
        &self,
        id: &DeviceId,
        characteristic: uuid::Uuid,
        data: &[u8],
    ) -> Result<(), RadioError> {
        let mut state = self.inner.state();
        let State { devices, links, .. } = &mut *state;
        let Some(link) = links.get(id) else {
            return Err(RadioError::NotConnected(id.clone()));
        };
        let Some(device) = devices.get_mut(id) else {
            return Err(RadioError::DeviceNotFound(id.clone()));
        };
        let writable = device
            .family()
            .profile()
            .and_then(|profile| profile.write)
            .is_some_and(|write| write == characteristic);
        if !writable {
            return Err(RadioError::CharacteristicNotFound(characteristic));
        }
        if let (Some(response), Some(notifier)) = (device.respond(data), &link.notifier)
            && notifier.try_send(response).is_err()
        {
            tracing::trace!(device_id = %id, "notification dropped, receiver busy or gone");
        }
        Ok(())
    }

    async fn disconnect(&self, id: &DeviceId) -> Result<(), RadioError> {
        self.inner.state().links.remove(id);
        Ok(())
    }
}

/// Advertise every simulated device until aborted or the radio is dropped.
async fn advertise(inner: Weak<Inner>, interval: Duration) {
    loop {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let descriptors: Vec<_> = inner
            .state()
            .devices
            .values()
            .map(SimulatedOximeter::descriptor)
            .collect();
        for descriptor in descriptors {
            let _ = inner.events.send(RadioEvent::Discovered(descriptor));
        }
        drop(inner);
        tokio::time::sleep(interval).await;
    }
}

/// Push fixed-frame frames to a subscriber until it goes away.
async fn stream_frames(inner: Weak<Inner>, id: DeviceId, tx: mpsc::Sender<Vec<u8>>) {
    let Some((period, fragment)) = inner.upgrade().map(|inner| {
        (
            Duration::from_millis(inner.config.stream_interval_ms),
            inner.config.fragment_notifications,
        )
    }) else {
        return;
    };
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let frame = inner
            .state()
            .devices
            .get_mut(&id)
            .map(SimulatedOximeter::next_fixed_frame);
        drop(inner);
        let Some(frame) = frame else {
            break;
        };
        let delivered = if fragment {
            send_fragmented(&tx, &frame).await
        } else {
            tx.send(frame.to_vec()).await.is_ok()
        };
        if !delivered {
            break;
        }
    }
    tracing::debug!(device_id = %id, "simulated stream ended");
}

async fn send_fragmented(tx: &mpsc::Sender<Vec<u8>>, frame: &[u8]) -> bool {
    for byte in frame {
        if tx.send(vec![*byte]).await.is_err() {
            return false;
        }
    }
    true
}

/// Hands out handles on one shared simulated world.
#[derive(Clone)]
pub struct SimulatedFactory {
    radio: SimulatedRadio,
}

impl SimulatedFactory {
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            radio: SimulatedRadio::new(config),
        }
    }

    /// A handle on the radio every [`create`](RadioFactory::create) returns,
    /// for scripting power and link loss.
    #[must_use]
    pub fn radio(&self) -> SimulatedRadio {
        self.radio.clone()
    }
}

impl Default for SimulatedFactory {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl RadioFactory for SimulatedFactory {
    type Radio = SimulatedRadio;

    async fn create(&self) -> Result<SimulatedRadio, RadioError> {
        Ok(self.radio.clone())
    }
}
