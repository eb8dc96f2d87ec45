//! End-to-end orchestrator scenarios against the in-memory control plane.
//!
//! Covers the contract the orchestrator guarantees across runs:
//!
//! - first run on an empty account creates every resource;
//! - a second identical run performs zero destructive mutations and
//!   resolves the same ARNs;
//! - policy versions never exceed the provider quota across repeated
//!   redeployments, and the newest version is always the default;
//! - unresolvable account identity aborts before any remote call;
//! - the notification install replaces unrelated bindings (intentional,
//!   documented loss);
//! - a partially-denied first run reconverges on the second.

use imgpipe::config::{ConfigOverrides, PipelineConfig, MAX_POLICY_VERSIONS};
use imgpipe::control_plane::memory::MemoryControlPlane;
use imgpipe::control_plane::NotificationBinding;
use imgpipe::provision::{Orchestrator, Step, StepOutcome};
use imgpipe::ImgpipeError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// A stand-in for the build step's output artifact.
fn build_artifact() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&[0x50, 0x4b, 0x03, 0x04, 0, 0, 0, 0]).unwrap();
    file
}

/// Resolve a config with timing tuned for tests (no real sleeps).
async fn resolved(plane: &MemoryControlPlane, artifact: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::resolve(plane, ConfigOverrides::default())
        .await
        .unwrap();
    config.artifact_path = artifact.to_path_buf();
    config.settle_delay_ms = 0;
    config.wait_poll_ms = 1;
    config
}

#[tokio::test]
async fn first_run_on_empty_account_creates_everything() {
    let plane = MemoryControlPlane::with_account("123456789012");
    let artifact = build_artifact();
    let config = resolved(&plane, artifact.path()).await;

    let report = Orchestrator::new(&plane, &config).run().await.unwrap();

    assert_eq!(report.outcome(Step::InboundStore), Some(StepOutcome::Created));
    assert_eq!(report.outcome(Step::OutboundStore), Some(StepOutcome::Created));
    assert_eq!(report.outcome(Step::Role), Some(StepOutcome::Created));
    assert_eq!(report.outcome(Step::Function), Some(StepOutcome::Created));
    assert_eq!(report.outcome(Step::Trigger), Some(StepOutcome::Created));

    assert!(report.role_arn.contains("role/"));
    assert!(report.function_arn.contains("function/"));

    // One default policy version after the first run.
    let versions = plane.policy_versions_by_name(&config.policy_name);
    assert_eq!(versions.len(), 1);
    assert!(versions[0].is_default);

    // Stores versioned, notification bound to the deployed function.
    assert!(plane.store_versioning(&config.inbound_store));
    assert!(plane.store_versioning(&config.outbound_store));
    let bindings = plane.notification_bindings(&config.inbound_store);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].function_arn, report.function_arn);
}

#[tokio::test]
async fn second_run_is_idempotent_and_non_destructive() {
    let plane = MemoryControlPlane::with_account("123456789012");
    let artifact = build_artifact();
    let config = resolved(&plane, artifact.path()).await;
    let orchestrator = Orchestrator::new(&plane, &config);

    let first = orchestrator.run().await.unwrap();
    plane.clear_mutations();
    let second = orchestrator.run().await.unwrap();

    // Same resolved identities.
    assert_eq!(first.role_arn, second.role_arn);
    assert_eq!(first.function_arn, second.function_arn);

    // Everything a no-op except the always-re-applied function update and
    // the absorbed duplicate permission grant.
    assert_eq!(second.outcome(Step::InboundStore), Some(StepOutcome::Unchanged));
    assert_eq!(second.outcome(Step::OutboundStore), Some(StepOutcome::Unchanged));
    assert_eq!(second.outcome(Step::Role), Some(StepOutcome::Unchanged));
    assert_eq!(second.outcome(Step::Function), Some(StepOutcome::Updated));
    assert_eq!(second.outcome(Step::Trigger), Some(StepOutcome::Updated));

    // No creation or deletion calls on the second run.
    for mutation in plane.mutations() {
        assert!(
            mutation.starts_with("update_function_")
                || mutation.starts_with("put_notification:"),
            "unexpected mutation on second run: {mutation}"
        );
    }
}

#[tokio::test]
async fn repeated_redeploys_never_exceed_policy_version_quota() {
    let plane = MemoryControlPlane::with_account("123456789012");
    let artifact = build_artifact();
    let config = resolved(&plane, artifact.path()).await;
    let orchestrator = Orchestrator::new(&plane, &config);

    orchestrator.run().await.unwrap();

    // An existing role short-circuits policy reconciliation, so delete it
    // between runs: each redeploy then recreates the role and rotates a
    // new version onto the surviving policy.
    for _ in 0..7 {
        plane.remove_role(&config.role_name);
        orchestrator.run().await.unwrap();

        let versions = plane.policy_versions_by_name(&config.policy_name);
        assert!(
            versions.len() <= MAX_POLICY_VERSIONS,
            "quota exceeded: {} versions",
            versions.len()
        );
        let defaults: Vec<_> = versions.iter().filter(|v| v.is_default).collect();
        assert_eq!(defaults.len(), 1);
        // The most recently created version is the default.
        let newest = versions.iter().max_by_key(|v| v.created_at).unwrap();
        assert!(newest.is_default);
    }
}

#[tokio::test]
async fn unresolvable_account_aborts_before_any_remote_call() {
    let plane = MemoryControlPlane::with_account("123456789012");
    plane.fail_account_resolution();

    let err = PipelineConfig::resolve(&plane, ConfigOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ImgpipeError::Config(_)));
    assert_eq!(plane.mutation_count(), 0, "no mutation before config resolves");
}

#[tokio::test]
async fn store_creation_branches_on_region() {
    let plane = MemoryControlPlane::with_account("123456789012");
    let artifact = build_artifact();
    let overrides = ConfigOverrides {
        region: Some("ap-southeast-2".to_string()),
        ..Default::default()
    };
    let mut config = PipelineConfig::resolve(&plane, overrides).await.unwrap();
    config.artifact_path = artifact.path().to_path_buf();
    config.settle_delay_ms = 0;
    config.wait_poll_ms = 1;

    Orchestrator::new(&plane, &config).run().await.unwrap();

    assert_eq!(
        plane.store_location_constraint(&config.inbound_store),
        Some(Some("ap-southeast-2".to_string()))
    );
}

#[tokio::test]
async fn wiring_replaces_unrelated_notification_bindings() {
    let plane = MemoryControlPlane::with_account("123456789012");
    let artifact = build_artifact();
    let config = resolved(&plane, artifact.path()).await;

    // A store provisioned earlier, carrying someone else's binding.
    plane.seed_store(&config.inbound_store);
    plane.seed_notification(
        &config.inbound_store,
        NotificationBinding {
            id: "unrelated-audit".to_string(),
            function_arn: "arn:cloud:compute::999:function/audit".to_string(),
            events: vec!["object:removed:*".to_string()],
        },
    );

    let report = Orchestrator::new(&plane, &config).run().await.unwrap();

    assert_eq!(report.outcome(Step::InboundStore), Some(StepOutcome::Unchanged));
    let bindings = plane.notification_bindings(&config.inbound_store);
    // Replace, not merge: the unrelated binding is gone. Intentional
    // behavior of the system as found.
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].function_arn, report.function_arn);
}

#[tokio::test]
async fn partially_denied_first_run_reconverges_on_second() {
    let plane = MemoryControlPlane::with_account("123456789012");
    let artifact = build_artifact();
    let config = resolved(&plane, artifact.path()).await;
    let orchestrator = Orchestrator::new(&plane, &config);

    // First run succeeds even though the policy attach is refused.
    plane.deny_policy_attach();
    let first = orchestrator.run().await.unwrap();
    assert_eq!(first.outcome(Step::Role), Some(StepOutcome::Created));
    assert!(plane.attached_policies(&config.role_name).is_empty());

    // Second run trusts the now-existing role as-is; it does not retry the
    // attach or touch the policy.
    plane.clear_mutations();
    let second = orchestrator.run().await.unwrap();
    assert_eq!(second.role_arn, first.role_arn);
    assert_eq!(second.outcome(Step::Role), Some(StepOutcome::Unchanged));
    assert!(plane
        .mutations()
        .iter()
        .all(|m| !m.starts_with("attach_role_policy") && !m.contains("policy")));
}

#[tokio::test]
async fn denied_role_creation_uses_fallback_and_stays_stable() {
    let plane = MemoryControlPlane::with_account("123456789012");
    let artifact = build_artifact();
    let config = resolved(&plane, artifact.path()).await;
    plane.deny_role_creation();
    let fallback = plane.seed_role("lambda-execution-role");
    let orchestrator = Orchestrator::new(&plane, &config);

    let first = orchestrator.run().await.unwrap();
    let second = orchestrator.run().await.unwrap();

    assert_eq!(first.role_arn, fallback.arn);
    assert_eq!(second.role_arn, fallback.arn);
}
