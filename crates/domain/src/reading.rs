//! Normalized physiological readings.
//!
//! Both vendor decoders produce a [`Measurement`]; the connection layer stamps
//! it with device identity, protocol tag, time and raw bytes to form a
//! [`NormalizedReading`]. A reading is always in exactly one
//! [`ReadingState`], so "no finger but an SpO2 value" cannot be expressed.

use serde::{Deserialize, Serialize};

use crate::classification::DeviceClassification;
use crate::id::DeviceId;
use crate::time::Timestamp;

/// Which of the three mutually exclusive states a reading is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ReadingState {
    /// No finger in the probe (or the probe reports no signal at all).
    NoFinger,
    /// A finger is present but the device is still searching for a pulse.
    Searching,
    /// Plausible vitals.
    Valid {
        /// Peripheral oxygen saturation, percent.
        spo2: u8,
        /// Pulse rate, beats per minute.
        heart_rate: u16,
    },
}

/// Decoder output: vitals plus device-reported quality flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(flatten)]
    pub state: ReadingState,
    /// Perfusion index, percent.
    pub perfusion_index: Option<f64>,
    /// Vendor-specific signal strength / pulse bar indicator.
    pub signal_strength: Option<u8>,
    pub low_perfusion: bool,
    pub motion_detected: bool,
    /// Set on the frame that coincides with a detected heartbeat.
    pub pulse_beep: bool,
    /// Battery level, percent, when the frame carries it.
    pub battery_level: Option<u8>,
}

impl Measurement {
    fn with_state(state: ReadingState) -> Self {
        Self {
            state,
            perfusion_index: None,
            signal_strength: None,
            low_perfusion: false,
            motion_detected: false,
            pulse_beep: false,
            battery_level: None,
        }
    }

    /// A reading with no finger detected.
    #[must_use]
    pub fn no_finger() -> Self {
        Self::with_state(ReadingState::NoFinger)
    }

    /// A reading taken while the device searches for a pulse.
    #[must_use]
    pub fn searching() -> Self {
        Self::with_state(ReadingState::Searching)
    }

    /// A reading with valid vitals.
    #[must_use]
    pub fn valid(spo2: u8, heart_rate: u16) -> Self {
        Self::with_state(ReadingState::Valid { spo2, heart_rate })
    }

    #[must_use]
    pub fn with_perfusion_index(mut self, perfusion_index: f64) -> Self {
        self.perfusion_index = Some(perfusion_index);
        self
    }

    #[must_use]
    pub fn with_signal_strength(mut self, signal_strength: u8) -> Self {
        self.signal_strength = Some(signal_strength);
        self
    }

    #[must_use]
    pub fn with_battery_level(mut self, battery_level: u8) -> Self {
        self.battery_level = Some(battery_level);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, low_perfusion: bool, motion_detected: bool) -> Self {
        self.low_perfusion = low_perfusion;
        self.motion_detected = motion_detected;
        self
    }

    #[must_use]
    pub fn with_pulse_beep(mut self, pulse_beep: bool) -> Self {
        self.pulse_beep = pulse_beep;
        self
    }
}

/// A decoded measurement attributed to a device — the record consumers store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    pub device_id: DeviceId,
    /// Protocol family that produced the reading.
    pub protocol: DeviceClassification,
    #[serde(flatten)]
    pub measurement: Measurement,
    pub received_at: Timestamp,
    /// Notification payload the reading was decoded from, for diagnostics.
    pub raw: Vec<u8>,
}

impl NormalizedReading {
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        protocol: DeviceClassification,
        measurement: Measurement,
        received_at: Timestamp,
        raw: Vec<u8>,
    ) -> Self {
        Self {
            device_id,
            protocol,
            measurement,
            received_at,
            raw,
        }
    }

    /// SpO2 in percent, only for valid readings.
    #[must_use]
    pub fn spo2(&self) -> Option<u8> {
        match self.measurement.state {
            ReadingState::Valid { spo2, .. } => Some(spo2),
            _ => None,
        }
    }

    /// Heart rate in bpm, only for valid readings.
    #[must_use]
    pub fn heart_rate(&self) -> Option<u16> {
        match self.measurement.state {
            ReadingState::Valid { heart_rate, .. } => Some(heart_rate),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_finger_detected(&self) -> bool {
        !matches!(self.measurement.state, ReadingState::NoFinger)
    }

    #[must_use]
    pub fn is_searching(&self) -> bool {
        matches!(self.measurement.state, ReadingState::Searching)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self.measurement.state, ReadingState::Valid { .. })
    }
}
