//! # pulselink-domain
//!
//! Pure domain model for the pulselink pulse-oximeter integration core.
//!
//! ## Responsibilities
//! - Foundational types: device identifiers, error conventions, timestamps
//! - Define **device descriptors** and their deterministic **classification**
//!   into a vendor protocol family
//! - Define the **normalized reading** — the only physiological record that
//!   leaves the integration core
//! - Define **connection states** and the tagged **link events** consumers see
//! - Implement the byte-exact **vendor frame decoders** and command encoders
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod classification;
pub mod connection;
pub mod device;
pub mod event;
pub mod permission;
pub mod protocol;
pub mod reading;
