//! Execution role resolution.
//!
//! Produces exactly one usable role ARN by trying strategies in priority
//! order and short-circuiting on the first success:
//!
//! 1. use the desired role if it already exists (trusted as-is, no policy
//!    reconciliation);
//! 2. create the desired role and its access policy, rotating policy
//!    versions when the provider's retention quota is full;
//! 3. probe a fixed chain of conventionally pre-existing fallback roles.
//!
//! AccessDenied abandons a strategy without aborting the run; only the
//! exhaustion of every strategy is fatal. This ordering is the core
//! idempotency contract: a re-run after a partial success reconverges to
//! the same role without destructive re-attempts.

use super::StepOutcome;
use crate::config::PipelineConfig;
use crate::control_plane::{ControlPlane, PolicyHandle, RoleHandle};
use crate::error::{ImgpipeError, Result};
use crate::policy::{render_access_policy, select_eviction, trust_policy};
use tracing::{debug, info, warn};

/// One role-resolution strategy, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Probe for the desired role by name.
    UseExisting,
    /// Create the desired role and its access policy.
    CreateRoleAndPolicy,
    /// Probe the fixed fallback role chain.
    FallbackChain,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::UseExisting => write!(f, "use-existing"),
            Strategy::CreateRoleAndPolicy => write!(f, "create-role-and-policy"),
            Strategy::FallbackChain => write!(f, "fallback-chain"),
        }
    }
}

const STRATEGY_ORDER: &[Strategy] = &[
    Strategy::UseExisting,
    Strategy::CreateRoleAndPolicy,
    Strategy::FallbackChain,
];

/// Resolves the execution role the compute function runs under.
pub struct RoleResolver<'a> {
    plane: &'a dyn ControlPlane,
    config: &'a PipelineConfig,
}

impl<'a> RoleResolver<'a> {
    /// Create a resolver over a control plane and resolved config.
    pub fn new(plane: &'a dyn ControlPlane, config: &'a PipelineConfig) -> Self {
        Self { plane, config }
    }

    /// Run the strategy chain; first success wins.
    ///
    /// Returns the resolved role and whether it was freshly created.
    /// Fails with [`ImgpipeError::NoUsableRole`] when every strategy is
    /// exhausted.
    pub async fn resolve(&self) -> Result<(RoleHandle, StepOutcome)> {
        let mut attempts = Vec::with_capacity(STRATEGY_ORDER.len());

        for strategy in STRATEGY_ORDER {
            match self.try_strategy(*strategy).await {
                Ok(Some((role, outcome))) => {
                    info!(strategy = %strategy, role = %role.arn, "Execution role resolved");
                    return Ok((role, outcome));
                }
                Ok(None) => {
                    debug!(strategy = %strategy, "Strategy not applicable, falling through");
                    attempts.push(format!("{strategy}: no role found"));
                }
                Err(e) => return Err(e),
            }
        }

        Err(ImgpipeError::NoUsableRole(attempts.join("; ")))
    }

    async fn try_strategy(&self, strategy: Strategy) -> Result<Option<(RoleHandle, StepOutcome)>> {
        match strategy {
            Strategy::UseExisting => Ok(self
                .plane
                .get_role(&self.config.role_name)
                .await?
                .map(|role| (role, StepOutcome::Unchanged))),
            Strategy::CreateRoleAndPolicy => self.create_role_and_policy().await,
            Strategy::FallbackChain => Ok(self
                .probe_fallback_chain()
                .await?
                .map(|role| (role, StepOutcome::Unchanged))),
        }
    }

    /// Strategy 2: create the desired role, then ensure its access policy.
    ///
    /// A refused or failed role creation abandons the strategy (`None`);
    /// once the role exists, hard failures in the policy pipeline are
    /// fatal, except an AccessDenied on attach, which is only a warning
    /// because the role may already carry sufficient permissions.
    async fn create_role_and_policy(&self) -> Result<Option<(RoleHandle, StepOutcome)>> {
        let role_name = &self.config.role_name;
        let role = match self.plane.create_role(role_name, &trust_policy()).await {
            Ok(role) => role,
            Err(e) if e.is_access_denied() => {
                info!(role = %role_name, "Role creation denied, trying fallback roles");
                return Ok(None);
            }
            Err(e) if e.is_already_exists() => {
                // Created between our probe and now, e.g. by a concurrent
                // run. Resolve and use it as-is: it is not freshly
                // created, so no settling window applies.
                return Ok(self
                    .plane
                    .get_role(role_name)
                    .await?
                    .map(|role| (role, StepOutcome::Unchanged)));
            }
            Err(e) => {
                warn!(role = %role_name, error = %e, "Role creation failed, trying fallback roles");
                return Ok(None);
            }
        };

        info!(role = %role.arn, "Execution role created");
        self.ensure_policy(&role).await?;
        Ok(Some((role, StepOutcome::Created)))
    }

    /// Create the access policy, or rotate a new default version onto the
    /// existing one, then attach it to the role.
    async fn ensure_policy(&self, role: &RoleHandle) -> Result<()> {
        let policy_name = &self.config.policy_name;
        let document = render_access_policy(
            &self.config.inbound_store,
            &self.config.outbound_store,
            &self.config.region,
        );

        let policy = match self.plane.create_policy(policy_name, &document).await {
            Ok(policy) => {
                info!(policy = %policy.arn, "Access policy created");
                policy
            }
            Err(e) if e.is_already_exists() => {
                let policy = self
                    .plane
                    .find_policy(policy_name)
                    .await?
                    .ok_or_else(|| ImgpipeError::NotFound(format!("policy {policy_name}")))?;
                self.rotate_policy_version(&policy, &document).await?;
                policy
            }
            Err(e) => return Err(e),
        };

        match self.plane.attach_role_policy(&role.name, &policy.arn).await {
            Ok(()) => debug!(role = %role.name, policy = %policy.arn, "Policy attached"),
            Err(e) if e.is_access_denied() => {
                warn!(
                    role = %role.name,
                    policy = %policy.arn,
                    "Policy attach denied; the role may already carry sufficient permissions"
                );
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Version rotation: evict the oldest non-default version when the
    /// retention quota is full, then publish the rendered document as the
    /// new default version.
    async fn rotate_policy_version(
        &self,
        policy: &PolicyHandle,
        document: &serde_json::Value,
    ) -> Result<()> {
        let versions = self.plane.list_policy_versions(&policy.arn).await?;
        if let Some(victim) = select_eviction(&versions) {
            info!(
                policy = %policy.arn,
                version = %victim.version_id,
                "Policy version quota full, evicting oldest"
            );
            self.plane
                .delete_policy_version(&policy.arn, &victim.version_id)
                .await?;
        }
        self.plane
            .create_policy_version(&policy.arn, document, true)
            .await?;
        info!(policy = %policy.arn, "New default policy version published");
        Ok(())
    }

    /// Strategy 3: probe the fallback chain in priority order.
    async fn probe_fallback_chain(&self) -> Result<Option<RoleHandle>> {
        for name in &self.config.fallback_roles {
            if let Some(role) = self.plane.get_role(name).await? {
                info!(role = %role.arn, "Using pre-existing fallback role");
                return Ok(Some(role));
            }
            debug!(role = %name, "Fallback role not present");
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::control_plane::memory::MemoryControlPlane;

    async fn resolved_config(plane: &MemoryControlPlane) -> PipelineConfig {
        PipelineConfig::resolve(plane, ConfigOverrides::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_existing_role_wins_over_creation() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;
        let seeded = plane.seed_role(&config.role_name);
        plane.clear_mutations();

        let (role, outcome) = RoleResolver::new(&plane, &config).resolve().await.unwrap();

        assert_eq!(role, seeded);
        assert_eq!(outcome, StepOutcome::Unchanged);
        // Trusted as-is: no policy reconciliation, no mutations at all.
        assert_eq!(plane.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_creates_role_and_policy_when_absent() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;

        let (role, outcome) = RoleResolver::new(&plane, &config).resolve().await.unwrap();

        assert_eq!(outcome, StepOutcome::Created);
        assert!(role.arn.ends_with(&config.role_name));
        assert_eq!(
            plane.attached_policies(&config.role_name).len(),
            1,
            "policy should be attached to the new role"
        );
        let versions = plane.policy_versions_by_name(&config.policy_name);
        assert_eq!(versions.len(), 1);
        assert!(versions[0].is_default);
    }

    #[tokio::test]
    async fn test_role_created_concurrently_is_used_unchanged() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;
        // The role exists but the first probe misses it, so the create
        // strategy runs and collides on AlreadyExists.
        let seeded = plane.seed_role(&config.role_name);
        plane.hide_roles_once();

        let (role, outcome) = RoleResolver::new(&plane, &config).resolve().await.unwrap();

        assert_eq!(role, seeded);
        // Not freshly created: no settle window, no policy pipeline.
        assert_eq!(outcome, StepOutcome::Unchanged);
        assert!(plane.policy_versions_by_name(&config.policy_name).is_empty());
    }

    #[tokio::test]
    async fn test_denied_creation_falls_back_to_chain() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;
        plane.deny_role_creation();
        let fallback = plane.seed_role("service-default-role");

        let (role, outcome) = RoleResolver::new(&plane, &config).resolve().await.unwrap();

        assert_eq!(role, fallback);
        assert_eq!(outcome, StepOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_fallback_chain_respects_priority_order() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;
        plane.deny_role_creation();
        plane.seed_role("default-exec-role");
        let first = plane.seed_role("lambda-execution-role");

        let (role, _) = RoleResolver::new(&plane, &config).resolve().await.unwrap();
        assert_eq!(role, first);
    }

    #[tokio::test]
    async fn test_provider_error_on_creation_also_falls_through() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;
        plane.fail_role_creation();
        let fallback = plane.seed_role("lambda-execution-role");

        let (role, _) = RoleResolver::new(&plane, &config).resolve().await.unwrap();
        assert_eq!(role, fallback);
    }

    #[tokio::test]
    async fn test_no_strategy_left_is_fatal() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;
        plane.deny_role_creation();

        let err = RoleResolver::new(&plane, &config).resolve().await.unwrap_err();
        assert!(matches!(err, ImgpipeError::NoUsableRole(_)));
    }

    #[tokio::test]
    async fn test_attach_denied_is_not_fatal() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;
        plane.deny_policy_attach();

        let (_, outcome) = RoleResolver::new(&plane, &config).resolve().await.unwrap();
        assert_eq!(outcome, StepOutcome::Created);
        assert!(plane.attached_policies(&config.role_name).is_empty());
    }

    #[tokio::test]
    async fn test_existing_policy_gets_new_default_version() {
        let plane = MemoryControlPlane::default();
        let config = resolved_config(&plane).await;
        let resolver = RoleResolver::new(&plane, &config);

        // First resolution creates role + policy v1.
        let (role, _) = resolver.resolve().await.unwrap();

        // The policy pipeline run again against the surviving policy must
        // rotate a new default version, not re-create the policy.
        resolver.ensure_policy(&role).await.unwrap();

        let versions = plane.policy_versions_by_name(&config.policy_name);
        assert_eq!(versions.len(), 2);
        let default: Vec<_> = versions.iter().filter(|v| v.is_default).collect();
        assert_eq!(default.len(), 1);
        assert_eq!(default[0].version_id, "v2");
    }
}
