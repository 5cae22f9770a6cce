//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the service layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod permission;
pub mod radio;

pub use permission::{CapabilityProvider, ImplicitCapabilities};
pub use radio::{Radio, RadioError, RadioEvent, RadioFactory};
