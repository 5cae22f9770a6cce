//! # pulselink-app
//!
//! Application layer — services and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `Radio` / `RadioFactory` — scan, connect, GATT discovery, notify, write
//!   - `CapabilityProvider` — platform runtime permission grants
//! - Provide the **services** built on those ports:
//!   - `PermissionGate` — capability and radio-power checks before scanning
//!   - `Scanner` — bounded, deduplicated, classified discovery
//!   - `ProtocolRegistry` — one decoder per device id
//!   - `ConnectionManager` — connect, poll, bounded automatic recovery
//!   - `Coordinator` — reference-counted radio ownership and the public surface
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `pulselink-domain` only (plus `tokio` for channels, tasks and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod ports;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;
