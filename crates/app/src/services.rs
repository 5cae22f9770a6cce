//! Application services — the link-layer use cases.
//!
//! Each service accepts port implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete radios.
//! The [`Coordinator`](coordinator::Coordinator) composes the others and is the
//! only entry point consumers need.

pub mod connection_manager;
pub mod coordinator;
pub mod permission_gate;
pub mod registry;
pub mod scanner;
