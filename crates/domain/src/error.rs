//! Packet-level error types.
//!
//! Packet errors never leave the decoding pipeline: radio noise is expected,
//! so a rejected packet is counted, trace-logged by the caller and dropped.
//! They exist so the reason for a drop stays typed and testable.

/// Why a notification payload did not produce a reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// The payload has no recognizable frame shape.
    #[error("malformed packet: {reason}")]
    Malformed {
        /// Short description of the structural problem.
        reason: &'static str,
    },

    /// A frame started with a byte other than the expected header.
    #[error("unexpected frame header 0x{found:02X}, expected 0x{expected:02X}")]
    UnexpectedHeader {
        /// Header byte the format requires.
        expected: u8,
        /// Byte actually received.
        found: u8,
    },

    /// The frame decoded but the vitals are physiologically implausible.
    #[error("reading out of range (spo2 {spo2}%, heart rate {heart_rate} bpm)")]
    OutOfRange {
        /// Decoded SpO2 percentage.
        spo2: u8,
        /// Decoded heart rate.
        heart_rate: u16,
    },

    /// The decoder family does not support building outgoing commands.
    #[error("protocol does not accept commands")]
    CommandsUnsupported,
}

impl PacketError {
    pub(crate) const fn malformed(reason: &'static str) -> Self {
        Self::Malformed { reason }
    }
}
