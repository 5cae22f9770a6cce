//! Protocol registry — one decoder per device id.
//!
//! Decoders are created lazily on first connection and survive reconnects so
//! their counters carry over; they are reset on every link loss and evicted
//! when the connection ends for good.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pulselink_domain::classification::DeviceClassification;
use pulselink_domain::id::DeviceId;
use pulselink_domain::protocol::{DecoderStats, ProtocolDecoder};

/// A decoder shared between a device's notification and polling tasks.
pub type SharedDecoder = Arc<Mutex<ProtocolDecoder>>;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    decoders: Mutex<HashMap<DeviceId, SharedDecoder>>,
}

impl ProtocolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The decoder for `id`, created on first use.
    ///
    /// Returns `None` for [`DeviceClassification::Unknown`]. A stored decoder
    /// of a different family is replaced.
    pub fn get_or_create(
        &self,
        id: &DeviceId,
        classification: DeviceClassification,
    ) -> Option<SharedDecoder> {
        let mut decoders = lock(&self.decoders);
        if let Some(existing) = decoders.get(id)
            && lock(existing).classification() == classification
        {
            return Some(Arc::clone(existing));
        }
        let decoder = Arc::new(Mutex::new(ProtocolDecoder::for_classification(
            classification,
        )?));
        tracing::debug!(device_id = %id, %classification, "created decoder");
        decoders.insert(id.clone(), Arc::clone(&decoder));
        Some(decoder)
    }

    /// Clear the decoder's buffers without forgetting it.
    pub fn reset(&self, id: &DeviceId) {
        if let Some(decoder) = lock(&self.decoders).get(id) {
            lock(decoder).reset();
        }
    }

    /// Reset and forget the decoder for `id`.
    pub fn evict(&self, id: &DeviceId) {
        if let Some(decoder) = lock(&self.decoders).remove(id) {
            lock(&decoder).reset();
            tracing::debug!(device_id = %id, "evicted decoder");
        }
    }

    pub fn evict_all(&self) {
        for (_, decoder) in lock(&self.decoders).drain() {
            lock(&decoder).reset();
        }
    }

    #[must_use]
    pub fn contains(&self, id: &DeviceId) -> bool {
        lock(&self.decoders).contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.decoders).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self, id: &DeviceId) -> Option<DecoderStats> {
        lock(&self.decoders).get(id).map(|d| lock(d).stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulselink_domain::protocol::Command;
    use std::time::Instant;

    fn id() -> DeviceId {
        DeviceId::new("AA:BB")
    }

    #[test]
    fn should_return_none_for_unknown_classification() {
        let registry = ProtocolRegistry::new();
        assert!(
            registry
                .get_or_create(&id(), DeviceClassification::Unknown)
                .is_none()
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn should_reuse_decoder_for_same_device() {
        let registry = ProtocolRegistry::new();
        let first = registry
            .get_or_create(&id(), DeviceClassification::FixedFrame)
            .unwrap();
        let second = registry
            .get_or_create(&id(), DeviceClassification::FixedFrame)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn should_replace_decoder_of_another_family() {
        let registry = ProtocolRegistry::new();
        let first = registry
            .get_or_create(&id(), DeviceClassification::FixedFrame)
            .unwrap();
        let second = registry
            .get_or_create(&id(), DeviceClassification::VariableFrame)
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(
            lock(&second).classification(),
            DeviceClassification::VariableFrame
        );
    }

    #[test]
    fn should_reset_decoder_on_evict() {
        let registry = ProtocolRegistry::new();
        let decoder = registry
            .get_or_create(&id(), DeviceClassification::VariableFrame)
            .unwrap();
        let first = lock(&decoder).build_command(Command::RealTimeData).unwrap();
        lock(&decoder).decode(&[0x00, 0x08], Instant::now());

        registry.evict(&id());
        assert!(!registry.contains(&id()));
        // The evicted instance was reset, so its sequence starts over.
        assert_eq!(
            lock(&decoder).build_command(Command::RealTimeData).unwrap(),
            first
        );
    }

    #[test]
    fn should_evict_everything() {
        let registry = ProtocolRegistry::new();
        registry.get_or_create(&DeviceId::new("a"), DeviceClassification::FixedFrame);
        registry.get_or_create(&DeviceId::new("b"), DeviceClassification::VariableFrame);
        registry.evict_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn should_expose_decoder_stats() {
        let registry = ProtocolRegistry::new();
        let decoder = registry
            .get_or_create(&id(), DeviceClassification::FixedFrame)
            .unwrap();
        lock(&decoder).decode(&[0xAA, 0x02, 0x08, 0x60, 0x48], Instant::now());
        assert_eq!(registry.stats(&id()).unwrap().decoded, 1);
        assert!(registry.stats(&DeviceId::new("other")).is_none());
    }
}
