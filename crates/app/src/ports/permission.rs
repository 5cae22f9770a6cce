//! Capability port — asking the host platform for runtime grants.

use std::future::Future;

use pulselink_domain::permission::Capability;

/// Requests runtime capabilities from the host platform.
pub trait CapabilityProvider: Send + Sync + 'static {
    /// Ask for `capability`, returning whether it is granted.
    fn request(&self, capability: Capability) -> impl Future<Output = bool> + Send;
}

/// Provider for hosts where every capability is implicitly granted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitCapabilities;

impl CapabilityProvider for ImplicitCapabilities {
    async fn request(&self, _capability: Capability) -> bool {
        true
    }
}
