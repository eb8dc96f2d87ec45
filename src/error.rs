//! Error types for imgpipe
//!
//! This module defines the main error type used throughout the orchestrator
//! and the classification helpers the provisioning steps use to decide
//! whether a control-plane failure is fatal, absorbable, or a signal to
//! fall through to the next strategy.

use thiserror::Error;

/// Result type alias for imgpipe operations
pub type Result<T> = std::result::Result<T, ImgpipeError>;

/// Errors surfaced by the orchestrator and the control-plane boundary.
#[derive(Debug, Error)]
pub enum ImgpipeError {
    /// Credentials or account identity could not be resolved. Always fatal
    /// and always raised before any remote mutation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The resource already exists. Steps that are idempotent by design
    /// absorb this locally; it never escalates out of the orchestrator.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The control plane refused the operation for this caller. Recoverable
    /// by strategy fallback during role resolution, warning-level elsewhere.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// A resource that must already exist was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No role resolution strategy produced a usable execution role.
    #[error(
        "No usable execution role: {0}. Create the role manually or re-run \
         with credentials permitted to create roles."
    )]
    NoUsableRole(String),

    /// The compute function reached a terminal failed state, or never
    /// became active within the waiter's poll budget.
    #[error("Function deployment failed: {0}")]
    FunctionFailed(String),

    /// Generic control-plane failure not classified above. Fatal.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ImgpipeError {
    /// True when the control plane refused the operation outright.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, ImgpipeError::AccessDenied(_))
    }

    /// True when the operation failed only because the resource is already
    /// there, which idempotent steps treat as success.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ImgpipeError::AlreadyExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        assert!(ImgpipeError::AccessDenied("iam:CreateRole".into()).is_access_denied());
        assert!(ImgpipeError::AlreadyExists("bucket".into()).is_already_exists());
        assert!(!ImgpipeError::Provider("throttled".into()).is_access_denied());
        assert!(!ImgpipeError::NotFound("role".into()).is_already_exists());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ImgpipeError::NoUsableRole("tried 3 strategies".into());
        assert!(err.to_string().contains("tried 3 strategies"));
        assert!(err.to_string().contains("Create the role manually"));
    }
}
