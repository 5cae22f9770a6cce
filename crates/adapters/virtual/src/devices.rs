//! Simulated oximeters.
//!
//! Each device walks a small deterministic pattern around its configured
//! baseline so consecutive readings differ without ever leaving the
//! plausible range.

use pulselink_domain::classification::DeviceClassification;
use pulselink_domain::device::DeviceDescriptor;
use pulselink_domain::id::DeviceId;
use pulselink_domain::protocol::crc::crc8;
use pulselink_domain::protocol::{Command, fixed_frame, variable_frame};

use crate::config::SimulatedDeviceConfig;

/// Pleth samples cycled through by fixed-frame devices.
const PLETH_WAVE: [u8; 8] = [0x10, 0x28, 0x50, 0x70, 0x60, 0x40, 0x28, 0x18];

const SIGNAL_STRENGTH: u8 = 0x06;
const PULSE_BEEP: u8 = 1 << 6;
const SYNC: u8 = 1 << 7;
const PERFUSION_INDEX_X10: u8 = 31;
const RSSI: i16 = -61;

pub(crate) struct SimulatedOximeter {
    config: SimulatedDeviceConfig,
    tick: u32,
}

impl SimulatedOximeter {
    pub(crate) fn new(config: SimulatedDeviceConfig) -> Self {
        Self { config, tick: 0 }
    }

    pub(crate) fn id(&self) -> DeviceId {
        DeviceId::new(self.config.id.clone())
    }

    pub(crate) fn family(&self) -> DeviceClassification {
        self.config.family
    }

    pub(crate) fn descriptor(&self) -> DeviceDescriptor {
        let services = self
            .config
            .family
            .profile()
            .map(|profile| profile.service)
            .into_iter();
        DeviceDescriptor::new(self.id(), Some(self.config.name.clone()))
            .with_services(services)
            .with_rssi(RSSI)
    }

    /// Characteristics a connected client finds after service discovery.
    pub(crate) fn characteristics(&self) -> Vec<uuid::Uuid> {
        self.config
            .family
            .profile()
            .map(|profile| std::iter::once(profile.notify).chain(profile.write).collect())
            .unwrap_or_default()
    }

    fn next_vitals(&mut self) -> (u8, u8) {
        let tick = self.tick;
        self.tick = self.tick.wrapping_add(1);
        let spo2 = if tick % 4 == 3 {
            self.config.spo2.saturating_sub(1)
        } else {
            self.config.spo2
        };
        let offset = u8::try_from(tick % 5).unwrap_or(0);
        let heart_rate = self.config.heart_rate.saturating_add(offset).saturating_sub(2);
        (spo2, heart_rate)
    }

    /// Next 5-byte frame of a fixed-frame device.
    pub(crate) fn next_fixed_frame(&mut self) -> [u8; fixed_frame::FRAME_LEN] {
        let index = usize::try_from(self.tick).unwrap_or(0) % PLETH_WAVE.len();
        let beep = if index == 0 { PULSE_BEEP } else { 0 };
        let (spo2, heart_rate) = self.next_vitals();
        fixed_frame::encode_frame(SYNC | beep | SIGNAL_STRENGTH, PLETH_WAVE[index], spo2, heart_rate)
    }

    /// Answer a command written by the host, `None` when the command is not
    /// one the device understands.
    pub(crate) fn respond(&mut self, command: &[u8]) -> Option<Vec<u8>> {
        let (crc, body) = command.split_last()?;
        if body.len() < variable_frame::HEADER_LEN
            || body[0] != variable_frame::COMMAND_HEADER
            || crc8(body) != *crc
        {
            tracing::debug!(device_id = %self.config.id, "ignoring malformed command");
            return None;
        }
        let code = body[1];
        let sequence = body[3];
        if code != Command::RealTimeData.code() {
            return variable_frame::encode_response(code, sequence, &[]).ok();
        }
        let payload = self.real_time_payload();
        variable_frame::encode_response(code, sequence, &payload).ok()
    }

    fn real_time_payload(&mut self) -> [u8; variable_frame::REAL_TIME_PAYLOAD_LEN] {
        let (spo2, heart_rate) = self.next_vitals();
        let [pulse_lo, pulse_hi] = u16::from(heart_rate).to_le_bytes();
        let [s0, s1, s2, s3] = self.tick.saturating_mul(3).to_le_bytes();
        [
            spo2,
            pulse_lo,
            pulse_hi,
            s0,
            s1,
            s2,
            s3,
            self.config.battery,
            0x00,
            0x00,
            PERFUSION_INDEX_X10,
            0x01,
            0x00,
        ]
    }
}
