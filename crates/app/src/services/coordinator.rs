//! Coordinator — the one owner of the radio and the public link surface.
//!
//! Consumers hold a [`RadioGuard`] for as long as they need Bluetooth. The
//! radio handle and the services built on it are created on the first
//! acquire and torn down a short grace period after the last guard goes away;
//! an acquire inside that window cancels the teardown and keeps the handle.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use pulselink_domain::classification::DeviceClassification;
use pulselink_domain::device::DeviceDescriptor;
use pulselink_domain::event::LinkEvent;
use pulselink_domain::permission::Platform;

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::event_bus::LinkEventBus;
use crate::ports::{CapabilityProvider, Radio, RadioFactory};
use crate::services::connection_manager::{
    ConnectionManager, ConnectionSnapshot, DisconnectTarget,
};
use crate::services::permission_gate::PermissionGate;
use crate::services::registry;
use crate::services::scanner::Scanner;

/// Services bound to one live radio handle.
struct RadioSession<R: Radio> {
    radio: Arc<R>,
    scanner: Scanner<R>,
    connections: ConnectionManager<R>,
    forwarder: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<R: Radio> RadioSession<R> {
    fn new(radio: R, config: &LinkConfig, bus: LinkEventBus) -> Self {
        let radio = Arc::new(radio);
        Self {
            scanner: Scanner::new(Arc::clone(&radio), config.scan_timeout()),
            connections: ConnectionManager::new(Arc::clone(&radio), bus, config.clone()),
            radio,
            forwarder: std::sync::Mutex::new(None),
        }
    }

    fn replace_forwarder(&self, forwarder: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(&mut *registry::lock(&self.forwarder), forwarder);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn shutdown(&self) {
        self.scanner.stop_scan().await;
        self.replace_forwarder(None);
        self.connections.shutdown().await;
    }
}

struct Lifecycle<R: Radio> {
    references: usize,
    session: Option<Arc<RadioSession<R>>>,
    teardown: Option<JoinHandle<()>>,
}

struct Shared<F: RadioFactory, C> {
    factory: F,
    gate: PermissionGate<C>,
    config: LinkConfig,
    bus: LinkEventBus,
    lifecycle: Mutex<Lifecycle<F::Radio>>,
}

/// Reference-counted owner of the radio.
///
/// Cheap to clone; clones share the same radio and event bus.
pub struct Coordinator<F: RadioFactory, C> {
    shared: Arc<Shared<F, C>>,
}

impl<F: RadioFactory, C> Clone for Coordinator<F, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: RadioFactory, C: CapabilityProvider> Coordinator<F, C> {
    pub fn new(factory: F, platform: Platform, capabilities: C, config: LinkConfig) -> Self {
        let bus = LinkEventBus::new(config.event_capacity);
        Self {
            shared: Arc::new(Shared {
                factory,
                gate: PermissionGate::new(platform, capabilities),
                config,
                bus,
                lifecycle: Mutex::new(Lifecycle {
                    references: 0,
                    session: None,
                    teardown: None,
                }),
            }),
        }
    }

    /// Take a reference on the radio, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the radio error raised while opening the adapter.
    pub async fn acquire(&self) -> Result<RadioGuard<F, C>, LinkError> {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        if let Some(teardown) = lifecycle.teardown.take() {
            teardown.abort();
            tracing::debug!("pending radio teardown cancelled");
        }
        if lifecycle.session.is_none() {
            let radio = self.shared.factory.create().await?;
            lifecycle.session = Some(Arc::new(RadioSession::new(
                radio,
                &self.shared.config,
                self.shared.bus.clone(),
            )));
            tracing::info!("radio created");
        }
        lifecycle.references += 1;
        tracing::debug!(references = lifecycle.references, "radio acquired");
        Ok(RadioGuard {
            coordinator: self.clone(),
            released: false,
        })
    }

    async fn release_one(&self) {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        lifecycle.references = lifecycle.references.saturating_sub(1);
        tracing::debug!(references = lifecycle.references, "radio released");
        if lifecycle.references > 0 || lifecycle.session.is_none() {
            return;
        }

        let grace = self.shared.config.teardown_grace();
        let coordinator = self.clone();
        let pending = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            coordinator.teardown_if_idle().await;
        });
        if let Some(previous) = lifecycle.teardown.replace(pending) {
            previous.abort();
        }
    }

    async fn teardown_if_idle(&self) {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        if lifecycle.references > 0 {
            return;
        }
        lifecycle.teardown = None;
        if let Some(session) = lifecycle.session.take() {
            // Shut down under the lock so a concurrent acquire waits for it.
            session.shutdown().await;
            tracing::info!("radio torn down");
        }
    }

    async fn session(&self) -> Result<Arc<RadioSession<F::Radio>>, LinkError> {
        self.shared
            .lifecycle
            .lock()
            .await
            .session
            .clone()
            .ok_or(LinkError::NotAcquired)
    }

    /// Check permissions and radio power, then scan for `target`.
    ///
    /// Matching devices are published as [`LinkEvent::DeviceFound`].
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotAcquired`] without a live guard, or the
    /// permission and radio errors described on
    /// [`PermissionGate::request_access`].
    pub async fn start_scan(&self, target: Option<DeviceClassification>) -> Result<(), LinkError> {
        let session = self.session().await?;
        self.shared
            .gate
            .request_access(session.radio.as_ref())
            .await?;
        let mut found = session.scanner.start_scan(target).await?;
        let bus = self.shared.bus.clone();
        session.replace_forwarder(Some(tokio::spawn(async move {
            while let Some(device) = found.recv().await {
                bus.publish(LinkEvent::DeviceFound(device));
            }
        })));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`LinkError::NotAcquired`] without a live guard.
    pub async fn stop_scan(&self) -> Result<(), LinkError> {
        self.session().await?.scanner.stop_scan().await;
        Ok(())
    }

    pub async fn is_scanning(&self) -> bool {
        match self.session().await {
            Ok(session) => session.scanner.is_scanning().await,
            Err(_) => false,
        }
    }

    /// Connect to a discovered device.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connect`]; additionally fails with
    /// [`LinkError::NotAcquired`] or a permission error.
    pub async fn connect_to_device(&self, descriptor: DeviceDescriptor) -> Result<(), LinkError> {
        let session = self.session().await?;
        self.shared
            .gate
            .request_access(session.radio.as_ref())
            .await?;
        session.connections.connect(descriptor).await
    }

    /// # Errors
    ///
    /// Returns [`LinkError::NotAcquired`] without a live guard.
    pub async fn disconnect(&self, target: DisconnectTarget) -> Result<(), LinkError> {
        self.session().await?.connections.disconnect(target).await;
        Ok(())
    }

    /// Subscribe to every link event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.bus.subscribe()
    }

    /// Snapshots of every connection; empty while the radio is down.
    pub async fn connections(&self) -> Vec<ConnectionSnapshot> {
        match self.session().await {
            Ok(session) => session.connections.snapshot().await,
            Err(_) => Vec::new(),
        }
    }

    pub async fn is_radio_active(&self) -> bool {
        self.shared.lifecycle.lock().await.session.is_some()
    }

    pub async fn reference_count(&self) -> usize {
        self.shared.lifecycle.lock().await.references
    }
}

/// Keeps the radio alive while held.
///
/// Prefer [`release`](Self::release) in async code; dropping the guard
/// schedules the release on the current runtime instead.
pub struct RadioGuard<F: RadioFactory, C: CapabilityProvider> {
    coordinator: Coordinator<F, C>,
    released: bool,
}

impl<F: RadioFactory, C: CapabilityProvider> RadioGuard<F, C> {
    pub async fn release(mut self) {
        self.released = true;
        self.coordinator.release_one().await;
    }

    #[must_use]
    pub fn coordinator(&self) -> &Coordinator<F, C> {
        &self.coordinator
    }
}

impl<F: RadioFactory, C: CapabilityProvider> std::fmt::Debug for RadioGuard<F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioGuard")
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<F: RadioFactory, C: CapabilityProvider> Drop for RadioGuard<F, C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let coordinator = self.coordinator.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { coordinator.release_one().await });
            }
            Err(_) => tracing::warn!("radio guard dropped outside a runtime, reference leaked"),
        }
    }
}
