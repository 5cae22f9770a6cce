//! # pulselink-adapter-virtual
//!
//! Simulated radio that serves virtual pulse oximeters for demos and
//! end-to-end tests, without a Bluetooth adapter.
//!
//! ## Default devices
//!
//! | Device | Id | Family | Behaviour |
//! |--------|----|--------|-----------|
//! | BerryMed BM1000 | `sim-berrymed-01` | fixed-frame | Streams a 5-byte frame every `stream_interval_ms` once subscribed |
//! | O2Ring 0421 | `sim-o2ring-01` | variable-frame | Answers each real-time request with a 13-byte payload |
//!
//! Power state, link loss and connection failures can be scripted through
//! [`SimulatedRadio`] to exercise the recovery paths.
//!
//! ## Dependency rule
//!
//! Depends on `pulselink-app` (port traits) and `pulselink-domain` only.

mod config;
mod devices;
mod radio;

pub use config::{SimulatedDeviceConfig, SimulatorConfig};
pub use radio::{SimulatedFactory, SimulatedRadio, SimulatorError};
