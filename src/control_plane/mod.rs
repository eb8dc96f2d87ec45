//! Control-plane boundary for imgpipe
//!
//! The orchestrator never talks to a provider SDK directly; every remote
//! operation goes through the [`ControlPlane`] trait so the provisioning
//! steps stay provider-agnostic and testable. The crate ships one
//! implementation, [`memory::MemoryControlPlane`], which backs both the
//! test suite and the binary's dry-run mode.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A resolved execution role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleHandle {
    /// Role name.
    pub name: String,
    /// ARN-like unique handle.
    pub arn: String,
}

/// A resolved permission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyHandle {
    /// Policy name.
    pub name: String,
    /// ARN-like unique handle.
    pub arn: String,
}

/// One retained version of a permission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersion {
    /// Provider-assigned version identifier.
    pub version_id: String,
    /// Whether this version is the policy's default.
    pub is_default: bool,
    /// Creation timestamp, used to pick the eviction victim.
    pub created_at: DateTime<Utc>,
}

/// Compute function lifecycle state as reported by the control plane.
///
/// Absence is modeled by the existence probe returning `None`, not by a
/// state variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionState {
    /// Function is being created and is not yet invocable.
    Creating,
    /// Function code or configuration is being updated.
    Updating,
    /// Function is ready to be invoked.
    Active,
    /// Function reached a terminal failed state.
    Failed,
}

/// Desired configuration of the compute function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Unique function name.
    pub name: String,
    /// Handler identifier within the artifact.
    pub handler: String,
    /// Memory limit in MB.
    pub memory_mb: u32,
    /// Timeout in seconds.
    pub timeout_secs: u32,
    /// Environment variables passed to the function.
    pub env: HashMap<String, String>,
    /// ARN of the execution role the function assumes.
    pub role_arn: String,
}

/// A deployed function as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescription {
    /// ARN-like unique handle.
    pub arn: String,
    /// Current lifecycle state.
    pub state: FunctionState,
    /// Configuration as currently deployed.
    pub spec: FunctionSpec,
}

/// The deployable code package produced by the external build step.
///
/// The orchestrator only consumes the build's output path; it never
/// inspects the package contents.
#[derive(Debug, Clone)]
pub struct CodeArtifact {
    /// Raw package bytes.
    pub bytes: Vec<u8>,
}

impl CodeArtifact {
    /// Load the artifact from the path the build step produced.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self { bytes })
    }
}

/// One store-side event binding pointing at a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBinding {
    /// Caller-chosen binding identifier.
    pub id: String,
    /// ARN of the function to invoke.
    pub function_arn: String,
    /// Event types that fire the binding.
    pub events: Vec<String>,
}

/// The complete notification configuration of a store.
///
/// Installed wholesale: a put replaces whatever configuration the store
/// carried before.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfiguration {
    /// All bindings on the store.
    pub bindings: Vec<NotificationBinding>,
}

/// Provider management API consumed by the orchestrator.
///
/// Every method maps to one remote operation; implementations surface
/// provider failures through the crate's error classification
/// (`AlreadyExists`, `AccessDenied`, `NotFound`, `Provider`).
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Resolve the caller's account identifier. Failure means credentials
    /// are absent and the run must abort before any mutation.
    async fn resolve_account_id(&self) -> Result<String>;

    // ── Object stores ────────────────────────────────────────────────

    /// Non-mutating existence probe for a store.
    async fn store_exists(&self, name: &str) -> Result<bool>;

    /// Create a store. `location_constraint` is `None` only for the
    /// provider's default region.
    async fn create_store(&self, name: &str, location_constraint: Option<&str>) -> Result<()>;

    /// Enable object versioning on a store.
    async fn enable_versioning(&self, name: &str) -> Result<()>;

    /// Install a notification configuration on a store, replacing any
    /// previously configured bindings.
    async fn put_notification_configuration(
        &self,
        store: &str,
        config: &NotificationConfiguration,
    ) -> Result<()>;

    // ── Identity and access ──────────────────────────────────────────

    /// Probe for a role by name.
    async fn get_role(&self, name: &str) -> Result<Option<RoleHandle>>;

    /// Create a role from a trust-policy document.
    async fn create_role(&self, name: &str, trust_policy: &serde_json::Value)
        -> Result<RoleHandle>;

    /// Probe for a policy by name.
    async fn find_policy(&self, name: &str) -> Result<Option<PolicyHandle>>;

    /// Create a policy from a permission document. Fails with
    /// `AlreadyExists` when the name is taken.
    async fn create_policy(
        &self,
        name: &str,
        document: &serde_json::Value,
    ) -> Result<PolicyHandle>;

    /// List all retained versions of a policy.
    async fn list_policy_versions(&self, policy_arn: &str) -> Result<Vec<PolicyVersion>>;

    /// Create a new policy version, optionally marking it default.
    async fn create_policy_version(
        &self,
        policy_arn: &str,
        document: &serde_json::Value,
        set_default: bool,
    ) -> Result<()>;

    /// Delete one non-default policy version.
    async fn delete_policy_version(&self, policy_arn: &str, version_id: &str) -> Result<()>;

    /// Attach a policy to a role.
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;

    // ── Compute function ─────────────────────────────────────────────

    /// Probe for a function by name.
    async fn get_function(&self, name: &str) -> Result<Option<FunctionDescription>>;

    /// Create a function from a spec and code package.
    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodeArtifact,
    ) -> Result<FunctionDescription>;

    /// Replace a function's code package. Safe to repeat.
    async fn update_function_code(&self, name: &str, code: &CodeArtifact) -> Result<()>;

    /// Replace a function's configuration. Safe to repeat.
    async fn update_function_configuration(&self, spec: &FunctionSpec) -> Result<()>;

    /// Grant the storage service permission to invoke a function, keyed by
    /// a unique statement id. A duplicate id fails with `AlreadyExists`,
    /// which callers absorb as an idempotent no-op.
    async fn add_invoke_permission(
        &self,
        function: &str,
        statement_id: &str,
        source_arn: &str,
    ) -> Result<()>;
}
