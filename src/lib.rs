#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # imgpipe
//!
//! Idempotent provisioning orchestrator for a small event-driven pipeline:
//! an inbound object store triggers a compute function on every new object,
//! and the function writes its result into an outbound object store.
//!
//! The crate's job is not the pipeline's business logic (the function's
//! artifact comes from an external build step); it is the orchestration of
//! the interdependent remote resources behind it, in strict dependency
//! order and tolerant of partial failure:
//!
//! 1. resolve configuration and the caller's account identity;
//! 2. ensure both object stores exist (create-if-absent, versioned);
//! 3. resolve a usable execution role, with a fallback chain for
//!    environments where role creation is administratively denied;
//! 4. create or update the compute function and wait for it to become
//!    active;
//! 5. grant the storage service invoke permission and install the event
//!    notification binding.
//!
//! Every step re-reads remote state before mutating, so re-running after a
//! partial failure is the documented recovery path. All remote calls go
//! through the [`control_plane::ControlPlane`] trait; the crate ships an
//! in-memory implementation that backs the test suite and the binary's
//! dry-run mode.
//!
//! ```no_run
//! use imgpipe::config::{ConfigOverrides, PipelineConfig};
//! use imgpipe::control_plane::memory::MemoryControlPlane;
//! use imgpipe::provision::Orchestrator;
//! use imgpipe::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let plane = MemoryControlPlane::with_account("123456789012");
//!     let config = PipelineConfig::resolve(&plane, ConfigOverrides::from_env()).await?;
//!     let report = Orchestrator::new(&plane, &config).run().await?;
//!     println!("function: {}", report.function_arn);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod policy;
pub mod provision;

pub use error::{ImgpipeError, Result};
