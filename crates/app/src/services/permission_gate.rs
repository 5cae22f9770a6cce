//! Permission gate — nothing touches the radio until the host allows it.

use pulselink_domain::permission::Platform;

use crate::error::LinkError;
use crate::ports::{CapabilityProvider, Radio};

/// Checks platform capabilities and radio power before scanning or connecting.
pub struct PermissionGate<C> {
    platform: Platform,
    capabilities: C,
}

impl<C: CapabilityProvider> PermissionGate<C> {
    pub fn new(platform: Platform, capabilities: C) -> Self {
        Self {
            platform,
            capabilities,
        }
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Request every capability the platform requires, then check radio power.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::PermissionDenied`] listing every refused
    /// capability, [`LinkError::RadioDisabled`] when the adapter is off, or a
    /// radio error if power state cannot be read.
    pub async fn request_access<R: Radio>(&self, radio: &R) -> Result<(), LinkError> {
        let mut missing = Vec::new();
        for &capability in self.platform.required_capabilities() {
            if !self.capabilities.request(capability).await {
                missing.push(capability);
            }
        }
        if !missing.is_empty() {
            tracing::warn!(?missing, platform = ?self.platform, "bluetooth permissions denied");
            return Err(LinkError::PermissionDenied { missing });
        }
        if !self.is_radio_powered_on(radio).await? {
            return Err(LinkError::RadioDisabled);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns a radio error if power state cannot be read.
    pub async fn is_radio_powered_on<R: Radio>(&self, radio: &R) -> Result<bool, LinkError> {
        Ok(radio.is_powered_on().await?)
    }
}
