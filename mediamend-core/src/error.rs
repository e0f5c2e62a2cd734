// ============================================================================
// mediamend-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Error Types for the Pipeline
//
// Two layers of errors live here. `CoreError` covers failures of the library
// itself (bad configuration, missing tools, I/O on job setup) and is returned
// synchronously to the caller. `StageError` covers the failure of a single
// stage for a single item; it is captured into the item's error list and never
// crosses item boundaries.

use crate::media::Stage;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;

// ============================================================================
// LIBRARY ERRORS
// ============================================================================

/// Errors surfaced synchronously by the core library.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Required external tool not found: {0}")]
    DependencyNotFound(String),

    #[error("Failed to start command '{0}': {1}")]
    CommandStart(String, std::io::Error),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("No input paths were supplied")]
    NoFilesFound,

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for core library operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

// ============================================================================
// PER-ITEM ERROR TAXONOMY
// ============================================================================

/// Classification of a per-item failure.
///
/// The kind decides whether the scheduler retries the stage: only
/// `TransientToolError` is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Classification could not determine a media kind.
    UnclassifiableInput,
    /// Timeout or transient network/process failure.
    TransientToolError,
    /// Malformed input, missing codec, unrecoverable tool exit.
    PermanentToolError,
    /// Invalid paths or missing tools detected at submission.
    ConfigurationError,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientToolError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::UnclassifiableInput => "UnclassifiableInput",
            ErrorKind::TransientToolError => "TransientToolError",
            ErrorKind::PermanentToolError => "PermanentToolError",
            ErrorKind::ConfigurationError => "ConfigurationError",
        };
        f.write_str(label)
    }
}

/// Failure of one stage for one item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} failed ({kind}): {message}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    pub fn transient(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientToolError, stage, message)
    }

    pub fn permanent(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermanentToolError, stage, message)
    }

    /// Wraps a filesystem failure inside a stage. I/O errors are not retried.
    pub fn io(stage: Stage, context: &str, err: std::io::Error) -> Self {
        Self::permanent(stage, format!("{}: {}", context, err))
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Result type for a single stage invocation.
pub type StageResult<T> = std::result::Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ErrorKind::TransientToolError.is_retryable());
        assert!(!ErrorKind::PermanentToolError.is_retryable());
        assert!(!ErrorKind::UnclassifiableInput.is_retryable());
        assert!(!ErrorKind::ConfigurationError.is_retryable());
    }

    #[test]
    fn stage_error_display_names_stage_and_kind() {
        let err = StageError::transient(Stage::FetchMetadata, "lookup timed out");
        assert_eq!(
            err.to_string(),
            "FetchMetadata failed (TransientToolError): lookup timed out"
        );
    }
}
