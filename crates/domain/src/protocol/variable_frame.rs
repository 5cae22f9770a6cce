//! Variable-frame family (vendor A).
//!
//! These devices speak three frame shapes on one notify characteristic and
//! need to be polled for real-time data.
//!
//! ## 8-byte status frame
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | Status flags (bit 4 finger out, bit 3 searching, bit 1 low perfusion, bit 0 motion) |
//! | 1 | Pleth waveform sample |
//! | 2 | Pulse bar graph |
//! | 3 | Perfusion index ×10 |
//! | 4 | SpO2 % |
//! | 5 | Pulse bpm |
//! | 6–7 | Reserved |
//!
//! Some firmwares deliver this frame one byte per notification; those bytes
//! are assembled in a buffer that is discarded after 5 s of silence.
//!
//! ## Response frame
//!
//! `[0x55, cmd, 0xFF, seq, !seq, len_lo, len_hi, payload…]`. A 13-byte
//! payload is a real-time measurement:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | SpO2 % |
//! | 1–2 | Pulse bpm (u16 LE) |
//! | 3–6 | Step counter |
//! | 7 | Battery % |
//! | 8 | Charge status |
//! | 9 | Acceleration magnitude |
//! | 10 | Perfusion index ×10 |
//! | 11 | Wear status (bit 0 worn) |
//! | 12 | Reserved |
//!
//! Every other payload length is a bare acknowledgement.
//!
//! ## Command frame
//!
//! `[0xAA, cmd, 0xFF, seq, !seq, len_lo, len_hi, payload…, crc8]` where the
//! sequence number wraps at 256 and is local to the decoder instance.

use std::time::{Duration, Instant};

use crate::error::PacketError;
use crate::protocol::assembly::{self, AssemblyBuffer};
use crate::protocol::crc::crc8;
use crate::protocol::{Command, FrameDecoder};
use crate::reading::Measurement;

/// Length of the status frame.
pub const STATUS_FRAME_LEN: usize = 8;
/// Length of the command/response header.
pub const HEADER_LEN: usize = 7;
/// Length of a real-time measurement payload.
pub const REAL_TIME_PAYLOAD_LEN: usize = 13;
/// First byte of outgoing command frames.
pub const COMMAND_HEADER: u8 = 0xAA;
/// First byte of device responses.
pub const RESPONSE_HEADER: u8 = 0x55;
/// Fixed marker at offset 2 of commands and responses.
pub const FRAME_MARKER: u8 = 0xFF;

/// Idle time after which a partially assembled frame is thrown away.
pub const STALE_AFTER: Duration = Duration::from_secs(5);

const STATUS_FINGER_OUT: u8 = 1 << 4;
const STATUS_SEARCHING: u8 = 1 << 3;
const STATUS_LOW_PERFUSION: u8 = 1 << 1;
const STATUS_MOTION: u8 = 1 << 0;
const WEAR_WORN: u8 = 1 << 0;

/// `(spo2, pulse)` offsets tried on payloads that match no known shape.
///
/// These come from older firmware captures and are a best-effort guess, not
/// vendor documentation; a hit must still pass the plausibility check.
const FALLBACK_OFFSETS: [(usize, usize); 3] = [(4, 5), (3, 4), (2, 3)];

/// Stateful decoder and command encoder for one variable-frame device.
#[derive(Debug)]
pub struct VariableFrameDecoder {
    buffer: AssemblyBuffer,
    sequence: u8,
}

impl Default for VariableFrameDecoder {
    fn default() -> Self {
        Self {
            buffer: AssemblyBuffer::new(STALE_AFTER, STATUS_FRAME_LEN * 4),
            sequence: 0,
        }
    }
}

impl VariableFrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next command will carry.
    #[must_use]
    pub fn next_sequence(&self) -> u8 {
        self.sequence
    }

    /// Build a sealed command frame and advance the sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Malformed`] if the command payload does not fit
    /// the 16-bit length field.
    pub fn build_command(&mut self, command: Command) -> Result<Vec<u8>, PacketError> {
        let frame = encode_command(command.code(), self.sequence, command.payload())?;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }

    fn assemble(
        &mut self,
        chunk: &[u8],
        received_at: Instant,
    ) -> Result<Option<Measurement>, PacketError> {
        self.buffer.push(chunk, received_at);
        if self.buffer.len() < STATUS_FRAME_LEN {
            return Ok(None);
        }
        let mut frame = [0u8; STATUS_FRAME_LEN];
        frame.copy_from_slice(&self.buffer.as_slice()[..STATUS_FRAME_LEN]);
        self.buffer.consume(STATUS_FRAME_LEN);
        decode_status_frame(&frame).map(Some)
    }
}

impl FrameDecoder for VariableFrameDecoder {
    fn try_decode(
        &mut self,
        payload: &[u8],
        received_at: Instant,
    ) -> Result<Option<Measurement>, PacketError> {
        if payload.is_empty() {
            return Err(PacketError::malformed("empty payload"));
        }
        // Status frames can start with the response header and marker bytes.
        if payload.len() == STATUS_FRAME_LEN && !is_complete_response(payload) {
            return decode_status_frame(payload).map(Some);
        }
        if is_response_frame(payload) {
            return decode_response(payload);
        }
        match payload.len() {
            STATUS_FRAME_LEN => decode_status_frame(payload).map(Some),
            REAL_TIME_PAYLOAD_LEN => decode_real_time(payload).map(Some),
            len if len < HEADER_LEN => self.assemble(payload, received_at),
            _ => decode_fallback(payload).map(Some),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.sequence = 0;
    }
}

/// Encode `[0xAA, code, 0xFF, seq, !seq, len_lo, len_hi, payload…, crc8]`.
///
/// # Errors
///
/// Returns [`PacketError::Malformed`] when `payload` exceeds `u16::MAX` bytes.
pub fn encode_command(code: u8, sequence: u8, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    encode_frame(COMMAND_HEADER, code, sequence, payload, true)
}

/// Encode a device response frame; used by simulators and tests.
///
/// # Errors
///
/// Returns [`PacketError::Malformed`] when `payload` exceeds `u16::MAX` bytes.
pub fn encode_response(code: u8, sequence: u8, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    encode_frame(RESPONSE_HEADER, code, sequence, payload, false)
}

fn encode_frame(
    header: u8,
    code: u8,
    sequence: u8,
    payload: &[u8],
    with_crc: bool,
) -> Result<Vec<u8>, PacketError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| PacketError::malformed("payload exceeds 16-bit length field"))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    frame.extend_from_slice(&[header, code, FRAME_MARKER, sequence, !sequence]);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    if with_crc {
        frame.push(crc8(&frame));
    }
    Ok(frame)
}

fn is_response_frame(payload: &[u8]) -> bool {
    payload.len() >= HEADER_LEN && payload[0] == RESPONSE_HEADER && payload[2] == FRAME_MARKER
}

/// A response frame whose sequence complement checks out and whose declared
/// body fits in the payload.
fn is_complete_response(payload: &[u8]) -> bool {
    is_response_frame(payload)
        && payload[4] == !payload[3]
        && usize::from(u16::from_le_bytes([payload[5], payload[6]])) <= payload.len() - HEADER_LEN
}

fn decode_response(frame: &[u8]) -> Result<Option<Measurement>, PacketError> {
    if frame[4] != !frame[3] {
        return Err(PacketError::malformed("sequence complement mismatch"));
    }
    let declared = usize::from(u16::from_le_bytes([frame[5], frame[6]]));
    if declared != REAL_TIME_PAYLOAD_LEN {
        return Ok(None);
    }
    let body = &frame[HEADER_LEN..];
    if body.len() < REAL_TIME_PAYLOAD_LEN {
        return Err(PacketError::malformed("truncated real-time payload"));
    }
    decode_real_time(&body[..REAL_TIME_PAYLOAD_LEN]).map(Some)
}

/// Decode an 8-byte status frame.
fn decode_status_frame(frame: &[u8]) -> Result<Measurement, PacketError> {
    let status = frame[0];
    let bargraph = frame[2];
    let pi_raw = frame[3];
    let spo2 = frame[4];
    let pulse = u16::from(frame[5]);

    let low_perfusion = status & STATUS_LOW_PERFUSION != 0;
    let motion = status & STATUS_MOTION != 0;

    if status & STATUS_FINGER_OUT != 0 {
        return Ok(Measurement::no_finger());
    }
    if status & STATUS_SEARCHING != 0 {
        return Ok(Measurement::searching().with_flags(low_perfusion, motion));
    }
    Ok(assembly::validated(spo2, pulse)?
        .with_perfusion_index(f64::from(pi_raw) / 10.0)
        .with_signal_strength(bargraph)
        .with_flags(low_perfusion, motion))
}

/// Decode a 13-byte real-time payload.
fn decode_real_time(payload: &[u8]) -> Result<Measurement, PacketError> {
    let spo2 = payload[0];
    let pulse = u16::from_le_bytes([payload[1], payload[2]]);
    let battery = payload[7];
    let accel = payload[9];
    let pi_raw = payload[10];
    let wear = payload[11];

    if wear & WEAR_WORN == 0 {
        return Ok(Measurement::no_finger().with_battery_level(battery));
    }
    let motion = accel > 0;
    if spo2 == 0 || spo2 == 0xFF || pulse == 0 || pulse == 0xFFFF {
        return Ok(Measurement::searching()
            .with_battery_level(battery)
            .with_flags(false, motion));
    }
    Ok(assembly::validated(spo2, pulse)?
        .with_perfusion_index(f64::from(pi_raw) / 10.0)
        .with_battery_level(battery)
        .with_flags(false, motion))
}

fn decode_fallback(payload: &[u8]) -> Result<Measurement, PacketError> {
    FALLBACK_OFFSETS
        .iter()
        .find_map(|&(spo2_at, pulse_at)| {
            let spo2 = *payload.get(spo2_at)?;
            let pulse = u16::from(*payload.get(pulse_at)?);
            assembly::is_plausible(spo2, pulse).then(|| Measurement::valid(spo2, pulse))
        })
        .ok_or(PacketError::malformed("no recognizable frame shape"))
}
