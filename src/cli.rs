//! CLI argument definitions for the imgpipe binary.

use crate::config::ConfigOverrides;
use clap::Parser;
use std::path::PathBuf;

/// imgpipe provisioning orchestrator
#[derive(Parser, Debug)]
#[command(name = "imgpipe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Provision the inbound-store -> function -> outbound-store pipeline")]
#[command(long_about = r#"Provision the inbound-store -> function -> outbound-store pipeline

Creates or idempotently reconciles the pipeline's remote resources in
dependency order: both object stores, the execution role and its access
policy, the compute function, and the event trigger binding. Re-running
after a partial failure reconverges without destructive re-attempts.

ENVIRONMENT VARIABLES:
    IMGPIPE_REGION          Provider region (default: us-east-1)
    IMGPIPE_NAME_PREFIX     Resource-name prefix (default: imgpipe)
    IMGPIPE_INBOUND_STORE   Explicit inbound store name
    IMGPIPE_OUTBOUND_STORE  Explicit outbound store name
    IMGPIPE_ROLE_NAME       Execution role name
    IMGPIPE_POLICY_NAME     Permission policy name
    IMGPIPE_FUNCTION_NAME   Compute function name
    IMGPIPE_ARTIFACT_PATH   Path to the deployable artifact
    IMGPIPE_SETTLE_DELAY_MS Settling delay after role creation

CLI flags take precedence over environment variables."#)]
pub struct Args {
    /// Provider region
    #[arg(long)]
    pub region: Option<String>,

    /// Resource-name prefix
    #[arg(long)]
    pub name_prefix: Option<String>,

    /// Explicit inbound store name (skips derivation)
    #[arg(long)]
    pub inbound_store: Option<String>,

    /// Explicit outbound store name (skips derivation)
    #[arg(long)]
    pub outbound_store: Option<String>,

    /// Execution role name
    #[arg(long)]
    pub role_name: Option<String>,

    /// Permission policy name
    #[arg(long)]
    pub policy_name: Option<String>,

    /// Compute function name
    #[arg(long)]
    pub function_name: Option<String>,

    /// Path to the deployable artifact produced by the build step
    #[arg(long)]
    pub artifact: Option<PathBuf>,

    /// Account identifier for the dry-run control plane
    #[arg(long, default_value = "000000000000")]
    pub account_id: String,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Overrides carried by the CLI flags.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            region: self.region.clone(),
            name_prefix: self.name_prefix.clone(),
            inbound_store: self.inbound_store.clone(),
            outbound_store: self.outbound_store.clone(),
            role_name: self.role_name.clone(),
            policy_name: self.policy_name.clone(),
            function_name: self.function_name.clone(),
            artifact_path: self.artifact.clone(),
            settle_delay_ms: None,
        }
    }
}
