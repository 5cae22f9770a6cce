//! Connection manager — per-device link lifecycle with bounded recovery.
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected        (requested)
//!                                       → Recovering → Connected
//!                                                    → Failed (attempts exhausted)
//! ```
//!
//! The manager is the single writer of connection records. Each record owns
//! the tasks scoped to its device (notification pump, polling loop, pending
//! reconnect), and every transition that supersedes a task aborts it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use pulselink_domain::classification::{DeviceClassification, GattProfile};
use pulselink_domain::connection::{ConnectionState, ConnectionStatus, DisconnectReason};
use pulselink_domain::device::DeviceDescriptor;
use pulselink_domain::event::LinkEvent;
use pulselink_domain::id::DeviceId;
use pulselink_domain::protocol::{Command, DecoderStats};
use pulselink_domain::reading::NormalizedReading;
use pulselink_domain::time::{self, Timestamp};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::event_bus::LinkEventBus;
use crate::ports::{Radio, RadioError, RadioEvent};
use crate::services::registry::{self, ProtocolRegistry, SharedDecoder};

/// Which connections a disconnect request applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectTarget {
    Device(DeviceId),
    All,
}

/// Read-only view of one connection record.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub descriptor: DeviceDescriptor,
    pub classification: DeviceClassification,
    pub state: ConnectionState,
    pub connected_at: Option<Timestamp>,
    pub recovery_attempts: u8,
    pub decoder_stats: Option<DecoderStats>,
}

#[derive(Default)]
struct LinkTasks {
    notifications: Option<JoinHandle<()>>,
    polling: Option<JoinHandle<()>>,
    recovery: Option<JoinHandle<()>>,
}

impl LinkTasks {
    fn abort_io(&mut self) {
        for handle in [self.notifications.take(), self.polling.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    fn abort_all(&mut self) {
        self.abort_io();
        if let Some(handle) = self.recovery.take() {
            handle.abort();
        }
    }
}

struct ConnectionRecord {
    descriptor: DeviceDescriptor,
    classification: DeviceClassification,
    state: ConnectionState,
    connected_at: Option<Timestamp>,
    recovery_attempts: u8,
    /// Identifies the `connect` call that created this record.
    generation: u64,
    /// The radio reported the link gone while a setup attempt was running.
    lost_during_setup: bool,
    tasks: LinkTasks,
}

impl ConnectionRecord {
    fn connecting(
        descriptor: DeviceDescriptor,
        classification: DeviceClassification,
        generation: u64,
    ) -> Self {
        Self {
            descriptor,
            classification,
            state: ConnectionState::Connecting,
            connected_at: None,
            recovery_attempts: 0,
            generation,
            lost_during_setup: false,
            tasks: LinkTasks::default(),
        }
    }

    fn mark_connected(&mut self, tasks: LinkTasks) {
        self.state = ConnectionState::Connected;
        self.connected_at = Some(time::now());
        self.tasks.notifications = tasks.notifications;
        self.tasks.polling = tasks.polling;
    }
}

type Records = HashMap<DeviceId, ConnectionRecord>;

struct Inner<R> {
    radio: Arc<R>,
    registry: ProtocolRegistry,
    bus: LinkEventBus,
    config: LinkConfig,
    records: Mutex<Records>,
    generations: AtomicU64,
}

/// Owns every connection record and the tasks scoped to them.
pub struct ConnectionManager<R: Radio> {
    inner: Arc<Inner<R>>,
    supervisor: JoinHandle<()>,
}

impl<R: Radio> ConnectionManager<R> {
    /// Create a manager and start watching the radio for link loss.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(radio: Arc<R>, bus: LinkEventBus, config: LinkConfig) -> Self {
        let events = radio.events();
        let inner = Arc::new(Inner {
            radio,
            registry: ProtocolRegistry::new(),
            bus,
            config,
            records: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        });
        let supervisor = tokio::spawn(supervise(Arc::clone(&inner), events));
        Self { inner, supervisor }
    }

    #[must_use]
    pub fn registry(&self) -> &ProtocolRegistry {
        &self.inner.registry
    }

    /// Connect to `descriptor`, subscribing and polling as its family requires.
    ///
    /// Connecting an already connected device succeeds without touching the
    /// radio. Setup is retried `setup_retries` times before giving up. A link
    /// the radio drops before setup completes counts as a failed attempt.
    /// Disconnecting the device meanwhile stops the retries and returns `Ok`.
    ///
    /// # Errors
    ///
    /// - [`LinkError::ClassificationUnknown`] for unsupported devices
    /// - [`LinkError::ConnectionInProgress`] while a connect or reconnect runs
    /// - [`LinkError::ConnectionSetupFailed`] once retries are exhausted
    #[tracing::instrument(skip(self, descriptor), fields(device_id = %descriptor.id))]
    pub async fn connect(&self, descriptor: DeviceDescriptor) -> Result<(), LinkError> {
        let id = descriptor.id.clone();
        let classification = DeviceClassification::classify(&descriptor);

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let (profile, decoder) = {
            let mut records = self.inner.records.lock().await;
            if let Some(record) = records.get(&id) {
                match record.state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Connecting | ConnectionState::Recovering => {
                        return Err(LinkError::ConnectionInProgress { device_id: id });
                    }
                    ConnectionState::Disconnected | ConnectionState::Failed => {}
                }
            }
            let (Some(profile), Some(decoder)) = (
                classification.profile(),
                self.inner.registry.get_or_create(&id, classification),
            ) else {
                return Err(LinkError::ClassificationUnknown { device_id: id });
            };
            records.insert(
                id.clone(),
                ConnectionRecord::connecting(descriptor, classification, generation),
            );
            (profile, decoder)
        };

        let mut attempt = 0;
        loop {
            if !self.inner.begin_setup_attempt(&id, generation).await {
                // Disconnected before this attempt started.
                return Ok(());
            }
            let result = self
                .inner
                .establish(&id, classification, profile, &decoder)
                .await;

            let mut records = self.inner.records.lock().await;
            let Some(record) = records
                .get_mut(&id)
                .filter(|record| record.generation == generation)
            else {
                // Disconnected while the link was being set up.
                let superseded = records.contains_key(&id);
                drop(records);
                if let Ok(mut tasks) = result {
                    tasks.abort_all();
                }
                if !superseded {
                    self.inner.disconnect_quietly(&id).await;
                }
                return Ok(());
            };

            let err = match result {
                Ok(tasks) if !record.lost_during_setup => {
                    record.mark_connected(tasks);
                    tracing::info!(%classification, "connected");
                    self.inner
                        .publish_status(ConnectionStatus::connected(id, classification));
                    return Ok(());
                }
                Ok(mut tasks) => {
                    tasks.abort_all();
                    RadioError::NotConnected(id.clone())
                }
                Err(err) => err,
            };

            if attempt < self.inner.config.setup_retries {
                attempt += 1;
                drop(records);
                tracing::warn!(error = %err, attempt, "connection setup failed, retrying");
                self.inner.disconnect_quietly(&id).await;
                continue;
            }

            tracing::warn!(error = %err, "connection setup failed");
            records.remove(&id);
            drop(records);
            self.inner.registry.evict(&id);
            self.inner.disconnect_quietly(&id).await;
            return Err(LinkError::ConnectionSetupFailed {
                device_id: id,
                source: err,
            });
        }
    }

    /// Tear down one or every connection.
    ///
    /// A status change with [`DisconnectReason::Requested`] is published for
    /// each targeted device, whether or not it was connected.
    pub async fn disconnect(&self, target: DisconnectTarget) {
        let removed: Vec<(DeviceId, Option<ConnectionRecord>)> = {
            let mut records = self.inner.records.lock().await;
            match target {
                DisconnectTarget::Device(id) => {
                    let record = records.remove(&id);
                    vec![(id, record)]
                }
                DisconnectTarget::All => records
                    .drain()
                    .map(|(id, record)| (id, Some(record)))
                    .collect(),
            }
        };

        for (id, record) in removed {
            let classification = record.map_or(DeviceClassification::Unknown, |mut record| {
                record.tasks.abort_all();
                record.classification
            });
            self.inner.disconnect_quietly(&id).await;
            self.inner.registry.evict(&id);
            tracing::info!(device_id = %id, "disconnected on request");
            self.inner.publish_status(ConnectionStatus::lost(
                id,
                classification,
                ConnectionState::Disconnected,
                DisconnectReason::Requested,
            ));
        }
    }

    /// Read-only copies of every connection record.
    pub async fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        let records = self.inner.records.lock().await;
        let mut snapshots: Vec<_> = records
            .iter()
            .map(|(id, record)| ConnectionSnapshot {
                descriptor: record.descriptor.clone(),
                classification: record.classification,
                state: record.state,
                connected_at: record.connected_at,
                recovery_attempts: record.recovery_attempts,
                decoder_stats: self.inner.registry.stats(id),
            })
            .collect();
        snapshots.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        snapshots
    }

    /// Disconnect everything and stop watching the radio.
    pub async fn shutdown(&self) {
        self.disconnect(DisconnectTarget::All).await;
        self.inner.registry.evict_all();
        self.supervisor.abort();
    }
}

impl<R: Radio> Drop for ConnectionManager<R> {
    fn drop(&mut self) {
        self.supervisor.abort();
        if let Ok(mut records) = self.inner.records.try_lock() {
            for record in records.values_mut() {
                record.tasks.abort_all();
            }
        }
    }
}

async fn supervise<R: Radio>(inner: Arc<Inner<R>>, mut events: broadcast::Receiver<RadioEvent>) {
    loop {
        match events.recv().await {
            Ok(RadioEvent::Disconnected(id)) => inner.handle_link_loss(&id).await,
            Ok(RadioEvent::Discovered(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "connection supervisor lagged behind radio events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

impl<R: Radio> Inner<R> {
    fn publish_status(&self, status: ConnectionStatus) {
        self.bus.publish(LinkEvent::ConnectionStatusChanged(status));
    }

    async fn disconnect_quietly(&self, id: &DeviceId) {
        if let Err(err) = self.radio.disconnect(id).await {
            tracing::debug!(device_id = %id, error = %err, "best-effort disconnect failed");
        }
    }

    /// Claim the record for one more setup attempt of `generation`.
    ///
    /// Returns `false` once the record was removed or replaced.
    async fn begin_setup_attempt(&self, id: &DeviceId, generation: u64) -> bool {
        let mut records = self.records.lock().await;
        match records.get_mut(id) {
            Some(record) if record.generation == generation => {
                record.lost_during_setup = false;
                true
            }
            _ => false,
        }
    }

    /// Connect, discover, subscribe, and start the device's IO tasks.
    async fn establish(
        &self,
        id: &DeviceId,
        classification: DeviceClassification,
        profile: &GattProfile,
        decoder: &SharedDecoder,
    ) -> Result<LinkTasks, RadioError> {
        self.radio.connect(id).await?;

        let characteristics = self.radio.discover_characteristics(id).await?;
        for required in std::iter::once(profile.notify).chain(profile.write) {
            if !characteristics.contains(&required) {
                return Err(RadioError::CharacteristicNotFound(required));
            }
        }

        let notifications = self.radio.subscribe(id, profile.notify).await?;
        let pump = tokio::spawn(pump_notifications(
            self.bus.clone(),
            id.clone(),
            classification,
            Arc::clone(decoder),
            notifications,
        ));
        let polling = profile.write.map(|write| {
            tokio::spawn(poll_real_time(
                Arc::clone(&self.radio),
                id.clone(),
                write,
                Arc::clone(decoder),
                self.config.poll_interval(),
            ))
        });

        Ok(LinkTasks {
            notifications: Some(pump),
            polling,
            recovery: None,
        })
    }

    async fn handle_link_loss(self: &Arc<Self>, id: &DeviceId) {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(id) else {
            return;
        };
        match record.state {
            ConnectionState::Connected => {}
            // The running setup attempt sees the flag once it returns.
            ConnectionState::Connecting | ConnectionState::Recovering => {
                record.lost_during_setup = true;
                self.registry.reset(id);
                return;
            }
            ConnectionState::Disconnected | ConnectionState::Failed => return,
        }
        record.tasks.abort_io();
        self.registry.reset(id);
        self.schedule_recovery(&mut records, id);
    }

    /// Count one more link loss: schedule a reconnect, or give up.
    fn schedule_recovery(self: &Arc<Self>, records: &mut Records, id: &DeviceId) {
        let Some(record) = records.get_mut(id) else {
            return;
        };
        let classification = record.classification;

        if record.recovery_attempts < self.config.max_recovery_attempts {
            record.recovery_attempts += 1;
            record.state = ConnectionState::Recovering;
            let attempt = record.recovery_attempts;
            let delay = self.config.recovery_delay(attempt);
            tracing::warn!(
                device_id = %id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "link lost, scheduling reconnect"
            );

            let inner = Arc::clone(self);
            let device_id = id.clone();
            record.tasks.recovery = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.recover(&device_id).await;
            }));

            self.publish_status(ConnectionStatus::lost(
                id.clone(),
                classification,
                ConnectionState::Recovering,
                DisconnectReason::LinkLost,
            ));
            return;
        }

        let attempts = record.recovery_attempts;
        if let Some(mut record) = records.remove(id) {
            record.tasks.abort_all();
        }
        self.registry.evict(id);
        tracing::error!(device_id = %id, attempts, "recovery exhausted, giving up");
        self.publish_status(ConnectionStatus::lost(
            id.clone(),
            classification,
            ConnectionState::Failed,
            DisconnectReason::RecoveryExhausted { attempts },
        ));
    }

    async fn recover(self: &Arc<Self>, id: &DeviceId) {
        let (classification, attempt) = {
            let mut records = self.records.lock().await;
            let Some(record) = records.get_mut(id) else {
                return;
            };
            if record.state != ConnectionState::Recovering {
                return;
            }
            // This task is running; nothing left to cancel.
            record.tasks.recovery = None;
            record.lost_during_setup = false;
            (record.classification, record.recovery_attempts)
        };
        let (Some(profile), Some(decoder)) = (
            classification.profile(),
            self.registry.get_or_create(id, classification),
        ) else {
            return;
        };

        tracing::info!(device_id = %id, attempt, "reconnecting");
        let result = self.establish(id, classification, profile, &decoder).await;

        let mut records = self.records.lock().await;
        let Some(record) = records
            .get_mut(id)
            .filter(|record| record.state == ConnectionState::Recovering)
        else {
            // Disconnected on request while reconnecting.
            if let Ok(mut tasks) = result {
                tasks.abort_all();
                drop(records);
                self.disconnect_quietly(id).await;
            }
            return;
        };
        let result = match result {
            Ok(mut tasks) if record.lost_during_setup => {
                tasks.abort_all();
                Err(RadioError::NotConnected(id.clone()))
            }
            other => other,
        };
        record.lost_during_setup = false;

        match result {
            Ok(tasks) => {
                record.mark_connected(tasks);
                record.recovery_attempts = 0;
                tracing::info!(device_id = %id, attempt, "reconnected");
                self.publish_status(ConnectionStatus::connected(id.clone(), classification));
            }
            Err(err) => {
                tracing::warn!(device_id = %id, attempt, error = %err, "reconnect failed");
                self.schedule_recovery(&mut records, id);
                drop(records);
                self.disconnect_quietly(id).await;
            }
        }
    }
}

/// Decode every notification to completion before taking the next one.
async fn pump_notifications(
    bus: LinkEventBus,
    device_id: DeviceId,
    classification: DeviceClassification,
    decoder: SharedDecoder,
    mut notifications: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(payload) = notifications.recv().await {
        let received_at = tokio::time::Instant::now().into_std();
        let outcome = registry::lock(&decoder).try_decode(&payload, received_at);
        match outcome {
            Ok(Some(measurement)) => bus.publish(LinkEvent::ReadingReceived(
                NormalizedReading::new(
                    device_id.clone(),
                    classification,
                    measurement,
                    time::now(),
                    payload,
                ),
            )),
            Ok(None) => {}
            Err(err) => tracing::trace!(device_id = %device_id, error = %err, "dropped packet"),
        }
    }
    tracing::debug!(device_id = %device_id, "notification stream ended");
}

/// Ask a polling device for a real-time reading once per interval.
async fn poll_real_time<R: Radio>(
    radio: Arc<R>,
    device_id: DeviceId,
    characteristic: Uuid,
    decoder: SharedDecoder,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let frame = match registry::lock(&decoder).build_command(Command::RealTimeData) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(device_id = %device_id, error = %err, "cannot build poll command");
                return;
            }
        };
        if let Err(err) = radio.write(&device_id, characteristic, &frame).await {
            tracing::debug!(device_id = %device_id, error = %err, "poll write failed");
        }
    }
}
