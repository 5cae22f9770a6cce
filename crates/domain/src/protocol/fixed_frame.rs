//! Fixed-frame family (vendor B).
//!
//! These devices stream 5-byte frames on a transparent-UART service without
//! being polled:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | Header `0xAA` |
//! | 1 | Status (bits 0–3 signal strength, bit 4 searching, bit 5 probe unplugged, bit 6 pulse beep, bit 7 sync) |
//! | 2 | Pleth waveform sample |
//! | 3 | SpO2 %, `127` when there is no signal |
//! | 4 | Pulse bpm, `255` when there is no signal |
//!
//! Frames split across notifications are reassembled by scanning a rolling
//! buffer for the header byte. The buffer is discarded after 1 s of silence.

use std::time::{Duration, Instant};

use crate::error::PacketError;
use crate::protocol::FrameDecoder;
use crate::protocol::assembly::{self, AssemblyBuffer};
use crate::reading::Measurement;

/// First byte of every frame.
pub const HEADER: u8 = 0xAA;
/// Frame length including the header.
pub const FRAME_LEN: usize = 5;

/// Idle time after which buffered bytes are thrown away.
pub const STALE_AFTER: Duration = Duration::from_secs(1);

/// Buffered length at which a header-less buffer is scanned byte by byte.
const SCAN_MIN_LEN: usize = 10;
const BUFFER_CAPACITY: usize = 64;

const SIGNAL_MASK: u8 = 0x0F;
const STATUS_SEARCHING: u8 = 1 << 4;
const STATUS_PROBE_UNPLUGGED: u8 = 1 << 5;
const STATUS_PULSE_BEEP: u8 = 1 << 6;
const STATUS_SYNC: u8 = 1 << 7;

const NO_SIGNAL_SPO2: u8 = 127;
const NO_SIGNAL_PULSE: u8 = 255;

/// Stateful decoder for one fixed-frame device.
#[derive(Debug)]
pub struct FixedFrameDecoder {
    buffer: AssemblyBuffer,
}

impl Default for FixedFrameDecoder {
    fn default() -> Self {
        Self {
            buffer: AssemblyBuffer::new(STALE_AFTER, BUFFER_CAPACITY),
        }
    }
}

impl FixedFrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `chunk` and decode the newest complete frame it completes.
    ///
    /// Older complete frames in the same buffer are superseded and dropped.
    fn assemble(
        &mut self,
        chunk: &[u8],
        received_at: Instant,
    ) -> Result<Option<Measurement>, PacketError> {
        self.buffer.push(chunk, received_at);
        let mut newest = None;
        loop {
            let bytes = self.buffer.as_slice();
            match bytes.iter().position(|&b| b == HEADER) {
                Some(start) if bytes.len() - start >= FRAME_LEN => {
                    let mut frame = [0u8; FRAME_LEN];
                    frame.copy_from_slice(&bytes[start..start + FRAME_LEN]);
                    self.buffer.consume(start + FRAME_LEN);
                    newest = Some(frame);
                }
                Some(start) => {
                    self.buffer.consume(start);
                    break;
                }
                None if newest.is_none() && bytes.len() >= SCAN_MIN_LEN => {
                    let result = scan_without_header(bytes);
                    self.buffer.clear();
                    return result.map(Some);
                }
                None => break,
            }
        }
        newest.map(|frame| decode_frame(&frame)).transpose()
    }
}

impl FrameDecoder for FixedFrameDecoder {
    fn try_decode(
        &mut self,
        payload: &[u8],
        received_at: Instant,
    ) -> Result<Option<Measurement>, PacketError> {
        match payload.len() {
            0 => Err(PacketError::malformed("empty payload")),
            FRAME_LEN => decode_frame(payload).map(Some),
            _ => self.assemble(payload, received_at),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Encode a frame; used by simulators and tests.
#[must_use]
pub fn encode_frame(status: u8, pleth: u8, spo2: u8, pulse: u8) -> [u8; FRAME_LEN] {
    [HEADER, status, pleth, spo2, pulse]
}

fn decode_frame(frame: &[u8]) -> Result<Measurement, PacketError> {
    if frame[0] != HEADER {
        return Err(PacketError::UnexpectedHeader {
            expected: HEADER,
            found: frame[0],
        });
    }
    decode_body(frame[1], frame[3], frame[4])
}

fn decode_body(status: u8, spo2: u8, pulse: u8) -> Result<Measurement, PacketError> {
    let signal = status & SIGNAL_MASK;
    let unplugged = status & STATUS_PROBE_UNPLUGGED != 0;

    if unplugged || spo2 == NO_SIGNAL_SPO2 || pulse == NO_SIGNAL_PULSE {
        return Ok(Measurement::no_finger().with_signal_strength(signal));
    }
    if status & STATUS_SEARCHING != 0 {
        return Ok(Measurement::searching().with_signal_strength(signal));
    }
    Ok(assembly::validated(spo2, u16::from(pulse))?
        .with_signal_strength(signal)
        .with_pulse_beep(status & STATUS_PULSE_BEEP != 0))
}

/// Last resort for buffers that lost their header byte: find a
/// `[status, pleth, spo2, pulse]` window whose status carries the sync bit and
/// whose vitals are plausible or the no-signal sentinels.
fn scan_without_header(bytes: &[u8]) -> Result<Measurement, PacketError> {
    bytes
        .windows(FRAME_LEN - 1)
        .find(|w| {
            let (status, spo2, pulse) = (w[0], w[2], w[3]);
            status & STATUS_SYNC != 0
                && (assembly::is_plausible(spo2, u16::from(pulse))
                    || spo2 == NO_SIGNAL_SPO2
                    || pulse == NO_SIGNAL_PULSE)
        })
        .ok_or(PacketError::malformed("no frame header in buffer"))
        .and_then(|w| decode_body(w[0], w[2], w[3]))
}
