//! Bounded, deduplicated discovery of supported oximeters.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

use pulselink_domain::classification::DeviceClassification;
use pulselink_domain::device::DiscoveredDevice;

use crate::error::LinkError;
use crate::ports::{Radio, RadioEvent};

const DISCOVERY_BUFFER: usize = 32;

/// Runs one scan session at a time against a shared radio.
///
/// Every named advertisement is classified; only devices matching the target
/// are surfaced, each at most once per session. A session stops on its own
/// after the configured ceiling.
pub struct Scanner<R> {
    radio: Arc<R>,
    timeout: Duration,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Radio> Scanner<R> {
    pub fn new(radio: Arc<R>, timeout: Duration) -> Self {
        Self {
            radio,
            timeout,
            session: Mutex::new(None),
        }
    }

    /// Start a scan, stopping any scan already running.
    ///
    /// `target` selects one protocol family; `None` surfaces every supported
    /// family. The returned channel closes when the scan ends.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::RadioDisabled`] when the adapter is off, or the
    /// radio error that prevented the scan from starting.
    pub async fn start_scan(
        &self,
        target: Option<DeviceClassification>,
    ) -> Result<mpsc::Receiver<DiscoveredDevice>, LinkError> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            self.end_session(previous).await;
        }

        if !self.radio.is_powered_on().await? {
            return Err(LinkError::RadioDisabled);
        }

        // Subscribe before starting so no early advertisement is missed.
        let events = self.radio.events();
        self.radio.start_scan().await?;
        tracing::info!(?target, timeout_secs = self.timeout.as_secs(), "scan started");

        let (tx, rx) = mpsc::channel(DISCOVERY_BUFFER);
        let radio = Arc::clone(&self.radio);
        let timeout = self.timeout;
        *session = Some(tokio::spawn(async move {
            run_session(events, tx, target, timeout).await;
            if let Err(err) = radio.stop_scan().await {
                tracing::warn!(error = %err, "failed to stop scan");
            }
        }));
        Ok(rx)
    }

    /// Stop the running scan, if any.
    pub async fn stop_scan(&self) {
        if let Some(handle) = self.session.lock().await.take() {
            self.end_session(handle).await;
        }
    }

    pub async fn is_scanning(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn end_session(&self, handle: JoinHandle<()>) {
        if handle.is_finished() {
            return;
        }
        handle.abort();
        if let Err(err) = self.radio.stop_scan().await {
            tracing::warn!(error = %err, "failed to stop scan");
        }
        tracing::info!("scan stopped");
    }
}

fn is_wanted(target: Option<DeviceClassification>, found: DeviceClassification) -> bool {
    match target {
        Some(target) => found == target,
        None => found.is_known(),
    }
}

async fn run_session(
    mut events: broadcast::Receiver<RadioEvent>,
    tx: mpsc::Sender<DiscoveredDevice>,
    target: Option<DeviceClassification>,
    timeout: Duration,
) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut seen = HashSet::new();

    loop {
        let event = tokio::select! {
            () = &mut deadline => {
                tracing::info!("scan ceiling reached");
                return;
            }
            event = events.recv() => event,
        };

        let descriptor = match event {
            Ok(RadioEvent::Discovered(descriptor)) => descriptor,
            Ok(RadioEvent::Disconnected(_)) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "scanner lagged behind radio events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        if descriptor.name.is_none() || !seen.insert(descriptor.id.clone()) {
            continue;
        }

        let found = DiscoveredDevice::classify(descriptor);
        tracing::debug!(
            device_id = %found.descriptor.id,
            name = found.descriptor.label(),
            classification = %found.classification,
            "advertisement classified"
        );
        if is_wanted(target, found.classification) && tx.send(found).await.is_err() {
            tracing::debug!("discovery receiver dropped, ending scan");
            return;
        }
    }
}
