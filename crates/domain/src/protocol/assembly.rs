//! Shared decoder plumbing: the streaming byte buffer and vitals validation.

use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use crate::error::PacketError;
use crate::reading::Measurement;

/// SpO2 values outside this range are treated as radio noise.
pub const SPO2_RANGE: RangeInclusive<u8> = 70..=100;

/// Heart-rate values outside this range are treated as radio noise.
pub const HEART_RATE_RANGE: RangeInclusive<u16> = 30..=250;

/// Whether a vitals pair is physiologically plausible.
pub(crate) fn is_plausible(spo2: u8, heart_rate: u16) -> bool {
    SPO2_RANGE.contains(&spo2) && HEART_RATE_RANGE.contains(&heart_rate)
}

/// A valid measurement, or [`PacketError::OutOfRange`].
pub(crate) fn validated(spo2: u8, heart_rate: u16) -> Result<Measurement, PacketError> {
    if is_plausible(spo2, heart_rate) {
        Ok(Measurement::valid(spo2, heart_rate))
    } else {
        Err(PacketError::OutOfRange { spo2, heart_rate })
    }
}

/// Rolling buffer for payloads that arrive in fragments.
///
/// Bytes left idle longer than `stale_after` are discarded on the next push
/// so a fresh frame is never glued onto the tail of an abandoned one.
#[derive(Debug)]
pub(crate) struct AssemblyBuffer {
    bytes: Vec<u8>,
    last_activity: Option<Instant>,
    stale_after: Duration,
    capacity: usize,
}

impl AssemblyBuffer {
    pub(crate) fn new(stale_after: Duration, capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            last_activity: None,
            stale_after,
            capacity,
        }
    }

    /// Append `chunk` received at `now`, dropping stale content first.
    ///
    /// When the buffer would exceed its capacity the oldest bytes go.
    pub(crate) fn push(&mut self, chunk: &[u8], now: Instant) {
        if self.is_stale(now) {
            self.bytes.clear();
        }
        self.bytes.extend_from_slice(chunk);
        if self.bytes.len() > self.capacity {
            let excess = self.bytes.len() - self.capacity;
            self.bytes.drain(..excess);
        }
        self.last_activity = Some(now);
    }

    fn is_stale(&self, now: Instant) -> bool {
        self.last_activity
            .is_some_and(|last| now.saturating_duration_since(last) > self.stale_after)
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Drop the first `count` bytes.
    pub(crate) fn consume(&mut self, count: usize) {
        let count = count.min(self.bytes.len());
        self.bytes.drain(..count);
    }

    pub(crate) fn clear(&mut self) {
        self.bytes.clear();
        self.last_activity = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_accumulate_fresh_chunks() {
        let t0 = Instant::now();
        let mut buffer = AssemblyBuffer::new(Duration::from_secs(1), 16);
        buffer.push(&[1, 2], t0);
        buffer.push(&[3], t0 + Duration::from_millis(500));
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn should_discard_stale_bytes_before_appending() {
        let t0 = Instant::now();
        let mut buffer = AssemblyBuffer::new(Duration::from_secs(1), 16);
        buffer.push(&[1, 2], t0);
        buffer.push(&[9], t0 + Duration::from_millis(1500));
        assert_eq!(buffer.as_slice(), &[9]);
    }

    #[test]
    fn should_keep_bytes_exactly_at_the_timeout() {
        let t0 = Instant::now();
        let mut buffer = AssemblyBuffer::new(Duration::from_secs(1), 16);
        buffer.push(&[1], t0);
        buffer.push(&[2], t0 + Duration::from_secs(1));
        assert_eq!(buffer.as_slice(), &[1, 2]);
    }

    #[test]
    fn should_drop_oldest_bytes_over_capacity() {
        let t0 = Instant::now();
        let mut buffer = AssemblyBuffer::new(Duration::from_secs(1), 4);
        buffer.push(&[1, 2, 3, 4, 5, 6], t0);
        assert_eq!(buffer.as_slice(), &[3, 4, 5, 6]);
    }

    #[test]
    fn should_consume_and_clear() {
        let t0 = Instant::now();
        let mut buffer = AssemblyBuffer::new(Duration::from_secs(1), 8);
        buffer.push(&[1, 2, 3], t0);
        buffer.consume(2);
        assert_eq!(buffer.as_slice(), &[3]);
        buffer.consume(10);
        assert_eq!(buffer.len(), 0);
        buffer.push(&[4], t0);
        buffer.clear();
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn should_validate_vitals_ranges() {
        assert!(validated(70, 30).is_ok());
        assert!(validated(100, 250).is_ok());
        assert_eq!(
            validated(69, 60),
            Err(PacketError::OutOfRange {
                spo2: 69,
                heart_rate: 60
            })
        );
        assert!(validated(98, 251).is_err());
        assert!(validated(101, 60).is_err());
        assert!(validated(98, 29).is_err());
    }
}
