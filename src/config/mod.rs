//! Configuration module for imgpipe
//!
//! Configuration is resolved once, up front, from three sources with this
//! precedence:
//! 1. **CLI arguments** (highest priority)
//! 2. **Environment variables** - `IMGPIPE_*` prefix
//! 3. **Built-in defaults** (lowest priority)
//!
//! Resolution makes exactly one control-plane call, to determine the
//! caller's account identifier; every derived resource name is computed
//! here exactly once and never recomputed downstream.

mod defaults;

pub use defaults::*;

use crate::control_plane::ControlPlane;
use crate::error::{ImgpipeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Optional overrides collected from CLI arguments and environment
/// variables before resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Provider region.
    pub region: Option<String>,
    /// Resource-name prefix.
    pub name_prefix: Option<String>,
    /// Explicit inbound store name (skips derivation).
    pub inbound_store: Option<String>,
    /// Explicit outbound store name (skips derivation).
    pub outbound_store: Option<String>,
    /// Execution role name.
    pub role_name: Option<String>,
    /// Permission policy name.
    pub policy_name: Option<String>,
    /// Compute function name.
    pub function_name: Option<String>,
    /// Path to the deployable artifact.
    pub artifact_path: Option<PathBuf>,
    /// Settling delay after role creation, in milliseconds.
    pub settle_delay_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Read overrides from `IMGPIPE_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            region: std::env::var("IMGPIPE_REGION").ok(),
            name_prefix: std::env::var("IMGPIPE_NAME_PREFIX").ok(),
            inbound_store: std::env::var("IMGPIPE_INBOUND_STORE").ok(),
            outbound_store: std::env::var("IMGPIPE_OUTBOUND_STORE").ok(),
            role_name: std::env::var("IMGPIPE_ROLE_NAME").ok(),
            policy_name: std::env::var("IMGPIPE_POLICY_NAME").ok(),
            function_name: std::env::var("IMGPIPE_FUNCTION_NAME").ok(),
            artifact_path: std::env::var("IMGPIPE_ARTIFACT_PATH").ok().map(PathBuf::from),
            settle_delay_ms: std::env::var("IMGPIPE_SETTLE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Layer `self` on top of `base`: any field set in `self` wins.
    pub fn over(self, base: Self) -> Self {
        Self {
            region: self.region.or(base.region),
            name_prefix: self.name_prefix.or(base.name_prefix),
            inbound_store: self.inbound_store.or(base.inbound_store),
            outbound_store: self.outbound_store.or(base.outbound_store),
            role_name: self.role_name.or(base.role_name),
            policy_name: self.policy_name.or(base.policy_name),
            function_name: self.function_name.or(base.function_name),
            artifact_path: self.artifact_path.or(base.artifact_path),
            settle_delay_ms: self.settle_delay_ms.or(base.settle_delay_ms),
        }
    }
}

/// Fully-resolved pipeline configuration.
///
/// Store names embed the account identifier so that globally-namespaced
/// resources are unique across accounts; all names are immutable once
/// resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Provider region.
    pub region: String,
    /// Resource-name prefix.
    pub name_prefix: String,
    /// Caller's account identifier, resolved from the control plane.
    pub account_id: String,
    /// Inbound object store (event source).
    pub inbound_store: String,
    /// Outbound object store (result destination).
    pub outbound_store: String,
    /// Execution role name.
    pub role_name: String,
    /// Permission policy name.
    pub policy_name: String,
    /// Compute function name.
    pub function_name: String,
    /// Function handler identifier.
    pub handler: String,
    /// Function memory limit in MB.
    pub memory_mb: u32,
    /// Function timeout in seconds.
    pub timeout_secs: u32,
    /// Path to the deployable artifact produced by the external build step.
    pub artifact_path: PathBuf,
    /// Fallback execution role names, probed in priority order.
    pub fallback_roles: Vec<String>,
    /// Settling delay after role/policy creation, in milliseconds.
    pub settle_delay_ms: u64,
    /// Interval between function-state polls, in milliseconds.
    pub wait_poll_ms: u64,
    /// Maximum function-state polls before the waiter gives up.
    pub wait_max_polls: u32,
}

impl PipelineConfig {
    /// Resolve the full configuration from overrides and defaults.
    ///
    /// Fails with [`ImgpipeError::Config`] when the account identifier
    /// cannot be resolved, which is treated as "control-plane credentials
    /// absent" and aborts before any mutation.
    pub async fn resolve(
        plane: &dyn ControlPlane,
        overrides: ConfigOverrides,
    ) -> Result<Self> {
        let account_id = plane.resolve_account_id().await.map_err(|e| {
            ImgpipeError::Config(format!(
                "cannot resolve account identity (are control-plane credentials configured?): {e}"
            ))
        })?;

        let name_prefix = overrides
            .name_prefix
            .unwrap_or_else(|| DEFAULT_NAME_PREFIX.to_string());
        let inbound_store = overrides
            .inbound_store
            .unwrap_or_else(|| format!("{name_prefix}-inbound-{account_id}"));
        let outbound_store = overrides
            .outbound_store
            .unwrap_or_else(|| format!("{name_prefix}-outbound-{account_id}"));

        let config = Self {
            region: overrides.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            name_prefix,
            account_id,
            inbound_store,
            outbound_store,
            role_name: overrides
                .role_name
                .unwrap_or_else(|| DEFAULT_ROLE_NAME.to_string()),
            policy_name: overrides
                .policy_name
                .unwrap_or_else(|| DEFAULT_POLICY_NAME.to_string()),
            function_name: overrides
                .function_name
                .unwrap_or_else(|| DEFAULT_FUNCTION_NAME.to_string()),
            handler: DEFAULT_HANDLER.to_string(),
            memory_mb: DEFAULT_MEMORY_MB,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            artifact_path: overrides
                .artifact_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_PATH)),
            fallback_roles: FALLBACK_ROLE_NAMES.iter().map(|s| s.to_string()).collect(),
            settle_delay_ms: overrides.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS),
            wait_poll_ms: DEFAULT_WAIT_POLL_MS,
            wait_max_polls: DEFAULT_WAIT_MAX_POLLS,
        };

        tracing::debug!(
            region = %config.region,
            account_id = %config.account_id,
            inbound = %config.inbound_store,
            outbound = %config.outbound_store,
            "Resolved pipeline configuration"
        );

        Ok(config)
    }

    /// True when the configured region is the provider's default region,
    /// whose store-create call must omit the location constraint.
    pub fn is_provider_default_region(&self) -> bool {
        self.region == PROVIDER_DEFAULT_REGION
    }

    /// Settling delay after role creation.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Interval between function-state polls.
    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }
}
