//! In-process link event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use pulselink_domain::event::LinkEvent;

/// Fan-out of [`LinkEvent`]s to every subscriber.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped). Slow subscribers lag rather than block
/// the radio.
#[derive(Debug, Clone)]
pub struct LinkEventBus {
    sender: broadcast::Sender<LinkEvent>,
}

impl LinkEventBus {
    /// Create a new event bus with the given channel capacity.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: LinkEvent) {
        // Only fails when nobody is listening.
        let _ = self.sender.send(event);
    }
}
