//! Error types for cairn operations.
//!
//! This module defines [`CairnError`], the primary error type used throughout
//! the application, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Collaborator clients carry their own error enums ([`ServiceError`],
//!   [`ControllerError`], [`TerraformError`]) which convert into `CairnError`
//! - Step failures are carried in `StepResult` values, not raised; the plan
//!   runner turns a failed result into a `StepFailed` error at the halt point
//! - Use `anyhow::Error` (via `CairnError::Other`) for unexpected errors

use thiserror::Error;

use crate::cluster::ServiceError;
use crate::controller::ControllerError;
use crate::provision::TerraformError;

/// Core error type for cairn operations.
#[derive(Debug, Error)]
pub enum CairnError {
    /// A preflight check found the environment unsuitable.
    #[error("Preflight check '{check}' failed: {message}")]
    PreflightFailed { check: String, message: String },

    /// A step reported a failure; the plan was halted at this step.
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// A later step required a result that an earlier plan never produced.
    #[error("No result recorded for step '{step}'")]
    MissingStepResult { step: String },

    /// Preseed file could not be read or parsed.
    #[error("Invalid preseed file: {message}")]
    PreseedError { message: String },

    /// Membership daemon reported an error.
    #[error(transparent)]
    Cluster(#[from] ServiceError),

    /// Deployment controller reported an error.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Terraform plan initialisation or apply failed.
    #[error(transparent)]
    Terraform(#[from] TerraformError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for cairn operations.
pub type Result<T> = std::result::Result<T, CairnError>;
