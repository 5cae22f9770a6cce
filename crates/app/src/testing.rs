//! Scriptable in-memory radio shared by the service tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use uuid::Uuid;

use pulselink_domain::classification::{
    FIXED_FRAME_NOTIFY, VARIABLE_FRAME_NOTIFY, VARIABLE_FRAME_WRITE,
};
use pulselink_domain::device::DeviceDescriptor;
use pulselink_domain::id::DeviceId;
use pulselink_domain::permission::Capability;

use crate::ports::{CapabilityProvider, Radio, RadioError, RadioEvent, RadioFactory};

pub(crate) fn berry(id: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(id, Some("BerryMed".to_string()))
}

pub(crate) fn o2ring(id: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(id, Some("O2Ring 2F1A".to_string()))
}

#[derive(Default)]
struct FakeState {
    failing_connects: usize,
    dropping_subscribes: usize,
    connect_delay: Option<Duration>,
    connect_calls: Vec<(DeviceId, Instant)>,
    disconnect_calls: Vec<DeviceId>,
    writes: Vec<(DeviceId, Uuid, Vec<u8>)>,
    notifiers: HashMap<DeviceId, mpsc::Sender<Vec<u8>>>,
    scripted_characteristics: HashMap<DeviceId, Vec<Uuid>>,
    scans_started: usize,
    scans_stopped: usize,
}

struct FakeInner {
    powered: AtomicBool,
    events: broadcast::Sender<RadioEvent>,
    state: Mutex<FakeState>,
}

#[derive(Clone)]
pub(crate) struct FakeRadio {
    inner: Arc<FakeInner>,
}

impl FakeRadio {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(FakeInner {
                powered: AtomicBool::new(true),
                events,
                state: Mutex::new(FakeState::default()),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.inner.state.lock().unwrap()
    }

    pub(crate) fn set_powered(&self, powered: bool) {
        self.inner.powered.store(powered, Ordering::SeqCst);
    }

    /// Make the next `count` connect calls fail.
    pub(crate) fn fail_next_connects(&self, count: usize) {
        self.state().failing_connects = count;
    }

    /// Drop the link right after each of the next `count` subscriptions.
    pub(crate) fn drop_link_on_next_subscribes(&self, count: usize) {
        self.state().dropping_subscribes = count;
    }

    /// Make every connect call take `delay` before answering.
    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        self.state().connect_delay = Some(delay);
    }

    pub(crate) fn set_characteristics(&self, id: &str, characteristics: Vec<Uuid>) {
        self.state()
            .scripted_characteristics
            .insert(DeviceId::new(id), characteristics);
    }

    pub(crate) fn advertise(&self, descriptor: DeviceDescriptor) {
        let _ = self.inner.events.send(RadioEvent::Discovered(descriptor));
    }

    /// Drop the link as the remote side would.
    pub(crate) fn drop_link(&self, id: &str) {
        let id = DeviceId::new(id);
        self.state().notifiers.remove(&id);
        let _ = self.inner.events.send(RadioEvent::Disconnected(id));
    }

    pub(crate) async fn notify(&self, id: &str, payload: &[u8]) {
        let sender = self.state().notifiers.get(&DeviceId::new(id)).cloned();
        sender
            .expect("device not subscribed")
            .send(payload.to_vec())
            .await
            .unwrap();
    }

    pub(crate) fn connect_calls(&self) -> Vec<Instant> {
        self.state().connect_calls.iter().map(|(_, at)| *at).collect()
    }

    pub(crate) fn disconnect_calls(&self) -> Vec<DeviceId> {
        self.state().disconnect_calls.clone()
    }

    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.state()
            .writes
            .iter()
            .map(|(_, _, data)| data.clone())
            .collect()
    }

    pub(crate) fn scans_started(&self) -> usize {
        self.state().scans_started
    }

    pub(crate) fn scans_stopped(&self) -> usize {
        self.state().scans_stopped
    }
}

impl Radio for FakeRadio {
    async fn is_powered_on(&self) -> Result<bool, RadioError> {
        Ok(self.inner.powered.load(Ordering::SeqCst))
    }

    fn events(&self) -> broadcast::Receiver<RadioEvent> {
        self.inner.events.subscribe()
    }

    async fn start_scan(&self) -> Result<(), RadioError> {
        self.state().scans_started += 1;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.state().scans_stopped += 1;
        Ok(())
    }

    async fn connect(&self, id: &DeviceId) -> Result<(), RadioError> {
        let delay = {
            let mut state = self.state();
            state.connect_calls.push((id.clone(), Instant::now()));
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(RadioError::DeviceNotFound(id.clone()));
        }
        Ok(())
    }

    async fn discover_characteristics(&self, id: &DeviceId) -> Result<Vec<Uuid>, RadioError> {
        Ok(self
            .state()
            .scripted_characteristics
            .get(id)
            .cloned()
            .unwrap_or_else(|| {
                vec![VARIABLE_FRAME_NOTIFY, VARIABLE_FRAME_WRITE, FIXED_FRAME_NOTIFY]
            }))
    }

    async fn subscribe(
        &self,
        id: &DeviceId,
        _characteristic: Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, RadioError> {
        let (tx, rx) = mpsc::channel(32);
        let dropped = {
            let mut state = self.state();
            if state.dropping_subscribes > 0 {
                state.dropping_subscribes -= 1;
                true
            } else {
                state.notifiers.insert(id.clone(), tx);
                false
            }
        };
        if dropped {
            let _ = self.inner.events.send(RadioEvent::Disconnected(id.clone()));
            // Let the supervisor observe the loss before setup returns.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(rx)
    }

    async fn write(&self, id: &DeviceId, characteristic: Uuid, data: &[u8]) -> Result<(), RadioError> {
        self.state()
            .writes
            .push((id.clone(), characteristic, data.to_vec()));
        Ok(())
    }

    async fn disconnect(&self, id: &DeviceId) -> Result<(), RadioError> {
        let mut state = self.state();
        state.disconnect_calls.push(id.clone());
        state.notifiers.remove(id);
        Ok(())
    }
}

/// Hands out clones of one [`FakeRadio`] and counts creations.
#[derive(Clone)]
pub(crate) struct FakeFactory {
    pub(crate) radio: FakeRadio,
    created: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub(crate) fn new(radio: FakeRadio) -> Self {
        Self {
            radio,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl RadioFactory for FakeFactory {
    type Radio = FakeRadio;

    async fn create(&self) -> Result<FakeRadio, RadioError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.radio.clone())
    }
}

/// Grants everything except a fixed deny list.
#[derive(Clone, Default)]
pub(crate) struct ScriptedCapabilities {
    pub(crate) denied: Vec<Capability>,
}

impl CapabilityProvider for ScriptedCapabilities {
    async fn request(&self, capability: Capability) -> bool {
        !self.denied.contains(&capability)
    }
}
