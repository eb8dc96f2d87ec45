//! Trigger wiring: invoke permission plus notification binding.
//!
//! Two-phase and order-dependent. The permission grant must precede the
//! notification install, and the install is a wholesale replace: any
//! pre-existing bindings on the inbound store are discarded. That loss is
//! the behavior of the system as found, documented rather than papered
//! over with merge semantics.

use super::StepOutcome;
use crate::config::PipelineConfig;
use crate::control_plane::{ControlPlane, FunctionDescription};
use crate::error::Result;
use crate::policy::{invoke_statement_id, notification_configuration, store_arn};
use tracing::{debug, info};

/// Wires the inbound store's object-created events to the function.
pub struct TriggerWirer<'a> {
    plane: &'a dyn ControlPlane,
    config: &'a PipelineConfig,
}

impl<'a> TriggerWirer<'a> {
    /// Create a wirer over a control plane and resolved config.
    pub fn new(plane: &'a dyn ControlPlane, config: &'a PipelineConfig) -> Self {
        Self { plane, config }
    }

    /// Grant the storage service invoke permission, then install the
    /// notification binding.
    ///
    /// The grant is keyed by a statement id derived from the store name;
    /// the provider's duplicate-id rejection is absorbed as an idempotent
    /// no-op. Any other failure at either phase is fatal; recovery is
    /// re-running the whole orchestrator.
    pub async fn wire(&self, function: &FunctionDescription) -> Result<StepOutcome> {
        let store = &self.config.inbound_store;
        let statement_id = invoke_statement_id(store);
        let source = store_arn(store);

        let mut outcome = StepOutcome::Created;
        match self
            .plane
            .add_invoke_permission(&self.config.function_name, &statement_id, &source)
            .await
        {
            Ok(()) => {
                info!(function = %self.config.function_name, statement = %statement_id,
                    "Invoke permission granted");
            }
            Err(e) if e.is_already_exists() => {
                debug!(statement = %statement_id, "Invoke permission already granted");
                outcome = StepOutcome::Updated;
            }
            Err(e) => return Err(e),
        }

        let config = notification_configuration(store, &function.arn);
        self.plane
            .put_notification_configuration(store, &config)
            .await?;
        info!(store = %store, function = %function.arn, "Notification binding installed");

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::control_plane::memory::MemoryControlPlane;
    use crate::control_plane::{CodeArtifact, FunctionSpec, NotificationBinding};

    async fn deployed(plane: &MemoryControlPlane) -> (PipelineConfig, FunctionDescription) {
        let config = PipelineConfig::resolve(plane, ConfigOverrides::default())
            .await
            .unwrap();
        plane.seed_store(&config.inbound_store);
        let spec = FunctionSpec {
            name: config.function_name.clone(),
            handler: config.handler.clone(),
            memory_mb: config.memory_mb,
            timeout_secs: config.timeout_secs,
            env: Default::default(),
            role_arn: plane.seed_role("r").arn,
        };
        let description = plane
            .create_function(&spec, &CodeArtifact { bytes: vec![0; 4] })
            .await
            .unwrap();
        (config, description)
    }

    #[tokio::test]
    async fn test_first_wire_grants_and_binds() {
        let plane = MemoryControlPlane::default();
        let (config, function) = deployed(&plane).await;

        let outcome = TriggerWirer::new(&plane, &config)
            .wire(&function)
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::Created);
        let bindings = plane.notification_bindings(&config.inbound_store);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].function_arn, function.arn);
    }

    #[tokio::test]
    async fn test_duplicate_grant_is_absorbed() {
        let plane = MemoryControlPlane::default();
        let (config, function) = deployed(&plane).await;
        let wirer = TriggerWirer::new(&plane, &config);

        wirer.wire(&function).await.unwrap();
        let outcome = wirer.wire(&function).await.unwrap();

        assert_eq!(outcome, StepOutcome::Updated);
        assert_eq!(plane.notification_bindings(&config.inbound_store).len(), 1);
    }

    #[tokio::test]
    async fn test_install_replaces_unrelated_bindings() {
        let plane = MemoryControlPlane::default();
        let (config, function) = deployed(&plane).await;
        // An unrelated binding someone else configured on the store. The
        // replace semantics intentionally discard it.
        plane.seed_notification(
            &config.inbound_store,
            NotificationBinding {
                id: "audit-binding".to_string(),
                function_arn: "arn:cloud:compute::9:function/audit".to_string(),
                events: vec!["object:removed:*".to_string()],
            },
        );

        TriggerWirer::new(&plane, &config)
            .wire(&function)
            .await
            .unwrap();

        let bindings = plane.notification_bindings(&config.inbound_store);
        assert_eq!(bindings.len(), 1, "prior bindings are lost by design");
        assert_eq!(bindings[0].function_arn, function.arn);
    }
}
