//! Timing and sizing knobs for the link services.

use std::time::Duration;

use serde::Deserialize;

/// Link-layer settings. Every field has a default matching device behaviour
/// observed in the field, so an empty section is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Ceiling after which a scan stops on its own.
    pub scan_timeout_secs: u64,
    /// Interval between real-time data requests to polling devices.
    pub poll_interval_ms: u64,
    /// Recovery attempt `n` waits `n × recovery_base_delay_ms`.
    pub recovery_base_delay_ms: u64,
    /// Unexpected disconnects tolerated before a device is marked failed.
    pub max_recovery_attempts: u8,
    /// Delay between the last guard release and radio teardown.
    pub teardown_grace_ms: u64,
    /// Capacity of the link event broadcast channel.
    pub event_capacity: usize,
    /// Extra attempts at connection setup before giving up.
    pub setup_retries: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 30,
            poll_interval_ms: 1_000,
            recovery_base_delay_ms: 2_000,
            max_recovery_attempts: 3,
            teardown_grace_ms: 500,
            event_capacity: 256,
            setup_retries: 1,
        }
    }
}

impl LinkConfig {
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Polling period, never shorter than one millisecond.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Delay before recovery attempt `attempt` (1-based).
    #[must_use]
    pub fn recovery_delay(&self, attempt: u8) -> Duration {
        Duration::from_millis(self.recovery_base_delay_ms) * u32::from(attempt)
    }

    #[must_use]
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}
