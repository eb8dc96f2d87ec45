//! Object store provisioning (create-if-absent, idempotent).

use super::StepOutcome;
use crate::config::PipelineConfig;
use crate::control_plane::ControlPlane;
use crate::error::Result;
use tracing::info;

/// Ensures the inbound and outbound object stores exist.
pub struct StoreProvisioner<'a> {
    plane: &'a dyn ControlPlane,
    config: &'a PipelineConfig,
}

impl<'a> StoreProvisioner<'a> {
    /// Create a provisioner over a control plane and resolved config.
    pub fn new(plane: &'a dyn ControlPlane, config: &'a PipelineConfig) -> Self {
        Self { plane, config }
    }

    /// Ensure one store exists, with versioning enabled as a durability
    /// safeguard.
    ///
    /// The existence probe is non-mutating; a present store is a logged
    /// no-op. The create call is region-aware: the provider's default
    /// region takes no location constraint, every other region takes an
    /// explicit one. Creation failure (e.g. a global name collision) is
    /// fatal.
    pub async fn ensure_store(&self, name: &str) -> Result<StepOutcome> {
        if self.plane.store_exists(name).await? {
            info!(store = %name, "Store already exists, skipping");
            return Ok(StepOutcome::Unchanged);
        }

        let location = if self.config.is_provider_default_region() {
            None
        } else {
            Some(self.config.region.as_str())
        };
        self.plane.create_store(name, location).await?;
        self.plane.enable_versioning(name).await?;

        info!(store = %name, region = %self.config.region, "Store created");
        Ok(StepOutcome::Created)
    }
}
