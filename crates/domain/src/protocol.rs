//! Vendor frame decoders.
//!
//! Each supported protocol family has a stateful decoder that turns raw
//! notification payloads into [`Measurement`]s. A decoder instance belongs to
//! exactly one device: it owns that device's fragment buffer and, for
//! families that poll, its command sequence counter.
//!
//! [`ProtocolDecoder`] is the closed set of families the connection layer
//! dispatches over.

mod assembly;
pub mod crc;
pub mod fixed_frame;
pub mod variable_frame;

use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use self::assembly::{HEART_RATE_RANGE, SPO2_RANGE};
use self::fixed_frame::FixedFrameDecoder;
use self::variable_frame::VariableFrameDecoder;
use crate::classification::DeviceClassification;
use crate::error::PacketError;
use crate::reading::Measurement;

/// Incremental decoding of one device's notification stream.
pub trait FrameDecoder {
    /// Feed one notification payload.
    ///
    /// Returns `Ok(None)` when the payload was consumed without completing a
    /// reading (a fragment, an acknowledgement), `Ok(Some(_))` for a reading,
    /// and `Err(_)` when the payload was rejected.
    ///
    /// `received_at` drives fragment staleness and must be monotonic.
    ///
    /// # Errors
    ///
    /// Returns a [`PacketError`] describing why the payload was dropped.
    fn try_decode(
        &mut self,
        payload: &[u8],
        received_at: Instant,
    ) -> Result<Option<Measurement>, PacketError>;

    /// Drop buffered fragments and restart any sequence counter.
    fn reset(&mut self);
}

/// Outgoing request understood by polling families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask for one real-time measurement.
    RealTimeData,
}

impl Command {
    /// Wire command code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::RealTimeData => 0x17,
        }
    }

    /// Command payload; empty for every command sent today.
    #[must_use]
    pub const fn payload(self) -> &'static [u8] {
        match self {
            Self::RealTimeData => &[],
        }
    }
}

/// Per-decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStats {
    /// Payloads that produced a reading.
    pub decoded: u64,
    /// Payloads rejected with a [`PacketError`].
    pub rejected: u64,
}

#[derive(Debug)]
enum Family {
    VariableFrame(VariableFrameDecoder),
    FixedFrame(FixedFrameDecoder),
}

/// Decoder for one device, dispatching on its protocol family.
#[derive(Debug)]
pub struct ProtocolDecoder {
    family: Family,
    stats: DecoderStats,
}

impl ProtocolDecoder {
    /// Create a fresh decoder, or `None` for [`DeviceClassification::Unknown`].
    #[must_use]
    pub fn for_classification(classification: DeviceClassification) -> Option<Self> {
        let family = match classification {
            DeviceClassification::VariableFrame => {
                Family::VariableFrame(VariableFrameDecoder::new())
            }
            DeviceClassification::FixedFrame => Family::FixedFrame(FixedFrameDecoder::new()),
            DeviceClassification::Unknown => return None,
        };
        Some(Self {
            family,
            stats: DecoderStats::default(),
        })
    }

    #[must_use]
    pub fn classification(&self) -> DeviceClassification {
        match self.family {
            Family::VariableFrame(_) => DeviceClassification::VariableFrame,
            Family::FixedFrame(_) => DeviceClassification::FixedFrame,
        }
    }

    /// Like [`decode`](Self::decode) but keeps the rejection reason.
    ///
    /// # Errors
    ///
    /// Returns the [`PacketError`] the family decoder rejected the payload with.
    pub fn try_decode(
        &mut self,
        payload: &[u8],
        received_at: Instant,
    ) -> Result<Option<Measurement>, PacketError> {
        let result = match &mut self.family {
            Family::VariableFrame(decoder) => decoder.try_decode(payload, received_at),
            Family::FixedFrame(decoder) => decoder.try_decode(payload, received_at),
        };
        match &result {
            Ok(Some(_)) => self.stats.decoded += 1,
            Ok(None) => {}
            Err(_) => self.stats.rejected += 1,
        }
        result
    }

    /// Decode a payload, dropping rejected packets silently.
    pub fn decode(&mut self, payload: &[u8], received_at: Instant) -> Option<Measurement> {
        self.try_decode(payload, received_at).ok().flatten()
    }

    /// Drop buffered fragments and restart the command sequence.
    pub fn reset(&mut self) {
        match &mut self.family {
            Family::VariableFrame(decoder) => decoder.reset(),
            Family::FixedFrame(decoder) => decoder.reset(),
        }
    }

    /// Build an outgoing command frame.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::CommandsUnsupported`] for families that stream
    /// without polling.
    pub fn build_command(&mut self, command: Command) -> Result<Vec<u8>, PacketError> {
        match &mut self.family {
            Family::VariableFrame(decoder) => decoder.build_command(command),
            Family::FixedFrame(_) => Err(PacketError::CommandsUnsupported),
        }
    }

    #[must_use]
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::ReadingState;

    #[test]
    fn should_not_create_decoder_for_unknown_devices() {
        assert!(ProtocolDecoder::for_classification(DeviceClassification::Unknown).is_none());
    }

    #[test]
    fn should_report_its_classification() {
        let decoder =
            ProtocolDecoder::for_classification(DeviceClassification::FixedFrame).unwrap();
        assert_eq!(decoder.classification(), DeviceClassification::FixedFrame);
    }

    #[test]
    fn should_dispatch_to_fixed_frame_family() {
        let mut decoder =
            ProtocolDecoder::for_classification(DeviceClassification::FixedFrame).unwrap();
        let m = decoder
            .decode(&[0xAA, 0x02, 0x08, 0x60, 0x48], Instant::now())
            .unwrap();
        assert_eq!(
            m.state,
            ReadingState::Valid {
                spo2: 96,
                heart_rate: 72
            }
        );
    }

    #[test]
    fn should_dispatch_to_variable_frame_family() {
        let mut decoder =
            ProtocolDecoder::for_classification(DeviceClassification::VariableFrame).unwrap();
        let m = decoder
            .decode(&[0x00, 0x08, 0x00, 0x00, 0x60, 0x48, 0x00, 0x00], Instant::now())
            .unwrap();
        assert_eq!(
            m.state,
            ReadingState::Valid {
                spo2: 96,
                heart_rate: 72
            }
        );
    }

    #[test]
    fn should_count_decoded_and_rejected_payloads() {
        let mut decoder =
            ProtocolDecoder::for_classification(DeviceClassification::VariableFrame).unwrap();
        let now = Instant::now();
        assert!(decoder.decode(&[], now).is_none());
        assert!(
            decoder
                .decode(&[0x00, 0x08, 0x00, 0x00, 0x60, 0x48, 0x00, 0x00], now)
                .is_some()
        );
        // A lone fragment is neither decoded nor rejected.
        assert!(decoder.decode(&[0x00], now).is_none());
        assert_eq!(
            decoder.stats(),
            DecoderStats {
                decoded: 1,
                rejected: 1
            }
        );
    }

    #[test]
    fn should_refuse_commands_for_streaming_family() {
        let mut decoder =
            ProtocolDecoder::for_classification(DeviceClassification::FixedFrame).unwrap();
        assert_eq!(
            decoder.build_command(Command::RealTimeData),
            Err(PacketError::CommandsUnsupported)
        );
    }

    #[test]
    fn should_restart_sequence_after_reset() {
        let mut decoder =
            ProtocolDecoder::for_classification(DeviceClassification::VariableFrame).unwrap();
        let first = decoder.build_command(Command::RealTimeData).unwrap();
        decoder.build_command(Command::RealTimeData).unwrap();
        decoder.reset();
        assert_eq!(decoder.build_command(Command::RealTimeData).unwrap(), first);
    }

    #[test]
    fn should_keep_decoders_independent() {
        let mut a =
            ProtocolDecoder::for_classification(DeviceClassification::VariableFrame).unwrap();
        let mut b =
            ProtocolDecoder::for_classification(DeviceClassification::VariableFrame).unwrap();
        let now = Instant::now();
        let frame = [0x00, 0x08, 0x00, 0x00, 0x60, 0x48, 0x00, 0x00];
        for byte in &frame[..4] {
            assert!(a.decode(&[*byte], now).is_none());
        }
        for byte in &frame[..7] {
            assert!(b.decode(&[*byte], now).is_none());
        }
        assert!(b.decode(&frame[7..], now).is_some());
        assert!(a.decode(&frame[4..5], now).is_none());
    }
}
