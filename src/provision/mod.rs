//! Provisioning orchestrator.
//!
//! Runs the five pipeline steps strictly in dependency order, fail-fast:
//! config is resolved by the caller, then inbound store, outbound store,
//! execution role, compute function, trigger wiring. Each step re-reads
//! remote state before mutating, so a re-run after a partial failure
//! reconverges without destructive re-attempts. There is no rollback;
//! re-running is the documented recovery path.

mod function;
mod role;
mod stores;
mod trigger;

pub use function::FunctionDeployer;
pub use role::RoleResolver;
pub use stores::StoreProvisioner;
pub use trigger::TriggerWirer;

use crate::config::PipelineConfig;
use crate::control_plane::{CodeArtifact, ControlPlane};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One step of the pipeline, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Inbound object store.
    InboundStore,
    /// Outbound object store.
    OutboundStore,
    /// Execution role resolution.
    Role,
    /// Compute function deployment.
    Function,
    /// Permission grant and notification binding.
    Trigger,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::InboundStore => write!(f, "inbound_store"),
            Step::OutboundStore => write!(f, "outbound_store"),
            Step::Role => write!(f, "role"),
            Step::Function => write!(f, "function"),
            Step::Trigger => write!(f, "trigger"),
        }
    }
}

/// What a step did to converge remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// The resource was freshly created.
    Created,
    /// The resource existed and was re-applied in place.
    Updated,
    /// The resource existed and nothing was changed (idempotent no-op).
    Unchanged,
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Created => write!(f, "created"),
            StepOutcome::Updated => write!(f, "updated"),
            StepOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Per-step outcome record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// Which step ran.
    pub step: Step,
    /// What it did.
    pub outcome: StepOutcome,
}

/// Outcome of one end-to-end orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationReport {
    /// ARN of the resolved execution role.
    pub role_arn: String,
    /// ARN of the deployed compute function.
    pub function_arn: String,
    /// Per-step outcomes, in execution order.
    pub steps: Vec<StepReport>,
}

impl OrchestrationReport {
    /// Outcome of a given step, if it ran.
    pub fn outcome(&self, step: Step) -> Option<StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| r.outcome)
    }
}

/// End-to-end provisioning run over a resolved configuration.
pub struct Orchestrator<'a> {
    plane: &'a dyn ControlPlane,
    config: &'a PipelineConfig,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator over a control plane and resolved config.
    pub fn new(plane: &'a dyn ControlPlane, config: &'a PipelineConfig) -> Self {
        Self { plane, config }
    }

    /// Run all steps in dependency order, aborting on the first fatal
    /// error.
    pub async fn run(&self) -> Result<OrchestrationReport> {
        let mut steps = Vec::with_capacity(5);

        let stores = StoreProvisioner::new(self.plane, self.config);
        let inbound = stores.ensure_store(&self.config.inbound_store).await?;
        steps.push(StepReport {
            step: Step::InboundStore,
            outcome: inbound,
        });
        let outbound = stores.ensure_store(&self.config.outbound_store).await?;
        steps.push(StepReport {
            step: Step::OutboundStore,
            outcome: outbound,
        });

        let resolver = RoleResolver::new(self.plane, self.config);
        let (role, role_outcome) = resolver.resolve().await?;
        steps.push(StepReport {
            step: Step::Role,
            outcome: role_outcome,
        });

        // A freshly created role is not immediately visible to the compute
        // service; give the control plane its eventual-consistency window
        // before the function-create call depends on it.
        if role_outcome == StepOutcome::Created && self.config.settle_delay_ms > 0 {
            tracing::info!(
                delay_ms = self.config.settle_delay_ms,
                "Waiting for role to settle"
            );
            tokio::time::sleep(self.config.settle_delay()).await;
        }

        let artifact = CodeArtifact::from_path(&self.config.artifact_path)?;
        let deployer = FunctionDeployer::new(self.plane, self.config);
        let (function, function_outcome) = deployer.deploy(&role.arn, &artifact).await?;
        steps.push(StepReport {
            step: Step::Function,
            outcome: function_outcome,
        });

        let wirer = TriggerWirer::new(self.plane, self.config);
        let trigger_outcome = wirer.wire(&function).await?;
        steps.push(StepReport {
            step: Step::Trigger,
            outcome: trigger_outcome,
        });

        let report = OrchestrationReport {
            role_arn: role.arn,
            function_arn: function.arn,
            steps,
        };

        tracing::info!(
            role = %report.role_arn,
            function = %report.function_arn,
            "Pipeline provisioned"
        );

        Ok(report)
    }
}
