//! imgpipe binary entry point.
//!
//! Parses arguments, initializes logging, resolves configuration, and runs
//! the orchestrator once. Exit contract: zero on full success; non-zero
//! with a descriptive message on the first fatal error.

use clap::Parser;
use imgpipe::cli::Args;
use imgpipe::config::{ConfigOverrides, PipelineConfig};
use imgpipe::control_plane::memory::MemoryControlPlane;
use imgpipe::provision::{OrchestrationReport, Orchestrator};
use imgpipe::{ImgpipeError, Result};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args).await {
        Ok(report) => {
            for step in &report.steps {
                info!(step = %step.step, outcome = %step.outcome, "Step complete");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Provisioning aborted");
            eprintln!("imgpipe: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<OrchestrationReport> {
    // The shipped control plane is the in-memory dry-run backend; a real
    // provider plugs in behind the same trait.
    let plane = MemoryControlPlane::with_account(&args.account_id);

    let overrides = args.overrides().over(ConfigOverrides::from_env());
    let config = PipelineConfig::resolve(&plane, overrides).await?;

    if !config.artifact_path.exists() {
        return Err(ImgpipeError::Config(format!(
            "artifact {} not found; run the build step first",
            config.artifact_path.display()
        )));
    }

    info!(
        region = %config.region,
        inbound = %config.inbound_store,
        outbound = %config.outbound_store,
        function = %config.function_name,
        "Provisioning pipeline"
    );

    Orchestrator::new(&plane, &config).run().await
}
