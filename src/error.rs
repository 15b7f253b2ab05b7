//! Error taxonomy for the approval, backup and implementation pipeline
//!
//! Every fallible library operation returns [`PipelineError`]. The CLI layer
//! wraps these in `anyhow` for reporting.

use thiserror::Error;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Nothing to do: {0}")]
    NoOp(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unknown change type: {0}")]
    UnknownChangeType(String),

    #[error("Invalid image change: {0}")]
    InvalidImageChange(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backup failed: {0}")]
    BackupFailure(String),

    #[error("Restore failed: {0}")]
    RestoreFailure(String),
}

impl PipelineError {
    /// Machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::NotFound(_) => "NOT_FOUND",
            PipelineError::InvalidState(_) => "INVALID_STATE",
            PipelineError::NoOp(_) => "NO_OP",
            PipelineError::PermissionDenied(_) => "PERMISSION_DENIED",
            PipelineError::UnknownChangeType(_) => "UNKNOWN_CHANGE_TYPE",
            PipelineError::InvalidImageChange(_) => "INVALID_IMAGE_CHANGE",
            PipelineError::InvalidField(_) => "INVALID_FIELD",
            PipelineError::InvalidType(_) => "INVALID_TYPE",
            PipelineError::Storage(_) => "STORAGE_FAILURE",
            PipelineError::Serialization(_) => "STORAGE_FAILURE",
            PipelineError::BackupFailure(_) => "STORAGE_FAILURE",
            PipelineError::RestoreFailure(_) => "RESTORE_FAILURE",
        }
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Helper to create a validation error
pub fn validation_error(msg: impl Into<String>) -> PipelineError {
    PipelineError::Validation(msg.into())
}

/// Helper to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> PipelineError {
    PipelineError::NotFound(msg.into())
}
