//! # pulselink-adapter-ble
//!
//! Radio adapter backed by the host Bluetooth stack via `btleplug`.
//!
//! ## How it works
//!
//! [`BtleplugRadio`] wraps one `btleplug` adapter. A background task turns
//! central events into [`RadioEvent`](pulselink_app::ports::RadioEvent)s and
//! remembers every peripheral it has seen, so later connect/subscribe/write
//! calls can address it by [`DeviceId`](pulselink_domain::id::DeviceId).
//!
//! Scans are unfiltered: oximeters do not reliably advertise their service
//! UUIDs, so classification happens upstream on names as well.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `pulselink-app` and `pulselink-domain`.

mod config;
mod error;
mod events;
mod gatt;
mod radio;

pub use config::BleConfig;
pub use error::BleError;
pub use radio::{BtleplugFactory, BtleplugRadio};
