//! Compute function deployment.
//!
//! Create-or-update: an absent function is created from the artifact; a
//! present one gets its code and then its configuration re-applied, two
//! separate calls that are each safe to repeat. Both branches end in a
//! bounded waiter that polls the function's reported state until Active.

use super::StepOutcome;
use crate::config::PipelineConfig;
use crate::control_plane::{
    CodeArtifact, ControlPlane, FunctionDescription, FunctionSpec, FunctionState,
};
use crate::error::{ImgpipeError, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Environment variable carrying the outbound store name into the
/// function's runtime.
pub const OUTBOUND_STORE_ENV: &str = "OUTBOUND_STORE";

/// Deploys the compute function and waits for it to become Active.
pub struct FunctionDeployer<'a> {
    plane: &'a dyn ControlPlane,
    config: &'a PipelineConfig,
}

impl<'a> FunctionDeployer<'a> {
    /// Create a deployer over a control plane and resolved config.
    pub fn new(plane: &'a dyn ControlPlane, config: &'a PipelineConfig) -> Self {
        Self { plane, config }
    }

    /// The function configuration this run converges to.
    fn desired_spec(&self, role_arn: &str) -> FunctionSpec {
        let mut env = HashMap::new();
        env.insert(
            OUTBOUND_STORE_ENV.to_string(),
            self.config.outbound_store.clone(),
        );
        FunctionSpec {
            name: self.config.function_name.clone(),
            handler: self.config.handler.clone(),
            memory_mb: self.config.memory_mb,
            timeout_secs: self.config.timeout_secs,
            env,
            role_arn: role_arn.to_string(),
        }
    }

    /// Create or update the function, then wait until it is Active.
    pub async fn deploy(
        &self,
        role_arn: &str,
        artifact: &CodeArtifact,
    ) -> Result<(FunctionDescription, StepOutcome)> {
        let name = &self.config.function_name;
        let spec = self.desired_spec(role_arn);

        let outcome = match self.plane.get_function(name).await? {
            None => {
                info!(function = %name, "Creating function");
                self.plane.create_function(&spec, artifact).await?;
                StepOutcome::Created
            }
            Some(_) => {
                info!(function = %name, "Function exists, re-applying code and configuration");
                self.plane.update_function_code(name, artifact).await?;
                self.plane.update_function_configuration(&spec).await?;
                StepOutcome::Updated
            }
        };

        let description = self.wait_until_active().await?;
        Ok((description, outcome))
    }

    /// Poll the function state at a fixed interval until Active, bounded
    /// by the configured poll budget. Failed is terminal and fatal; so is
    /// budget exhaustion.
    async fn wait_until_active(&self) -> Result<FunctionDescription> {
        let name = &self.config.function_name;

        for attempt in 1..=self.config.wait_max_polls {
            let description = self
                .plane
                .get_function(name)
                .await?
                .ok_or_else(|| ImgpipeError::NotFound(format!("function {name}")))?;

            match description.state {
                FunctionState::Active => {
                    info!(function = %name, attempts = attempt, "Function is active");
                    return Ok(description);
                }
                FunctionState::Failed => {
                    return Err(ImgpipeError::FunctionFailed(format!(
                        "function {name} reached a terminal failed state"
                    )));
                }
                FunctionState::Creating | FunctionState::Updating => {
                    debug!(function = %name, attempt, state = ?description.state, "Waiting for function");
                    tokio::time::sleep(self.config.wait_poll_interval()).await;
                }
            }
        }

        Err(ImgpipeError::FunctionFailed(format!(
            "function {name} did not become active within {} polls",
            self.config.wait_max_polls
        )))
    }
}
