//! Domain-level error taxonomy for Codecheck.

use super::check::{CheckId, CheckStatus};

/// Errors produced by the upload gate. No check record exists when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no file was uploaded")]
    MissingFile,

    #[error("file name must not be empty")]
    EmptyFileName,

    #[error("file name {name:?} contains unsupported characters")]
    InvalidFileName { name: String },

    #[error("unsupported file type: {extension:?}")]
    DisallowedExtension { extension: String },

    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

/// Errors produced by the check registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("check not found: {id}")]
    NotFound { id: CheckId },

    #[error("check {id}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        id: CheckId,
        from: CheckStatus,
        to: CheckStatus,
    },

    #[error("check {id}: field {field} is immutable")]
    ImmutableField { id: CheckId, field: &'static str },

    #[error("check {id}: result is already set")]
    ResultAlreadySet { id: CheckId },

    #[error("check {id}: result must be present exactly when status is terminal (status {status})")]
    ResultStatusMismatch { id: CheckId, status: CheckStatus },

    #[error("check {id}: logs are append-only")]
    LogsRewritten { id: CheckId },
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::DisallowedExtension {
            extension: "exe".to_string(),
        };
        assert_eq!(err.to_string(), "unsupported file type: \"exe\"");

        let err = ValidationError::TooLarge {
            size: 11,
            limit: 10,
        };
        assert!(err.to_string().contains("limit is 10"));
    }

    #[test]
    fn test_registry_error_mentions_id() {
        let err = RegistryError::InvalidTransition {
            id: CheckId::from_external("c1"),
            from: CheckStatus::Completed,
            to: CheckStatus::Processing,
        };
        assert_eq!(
            err.to_string(),
            "check c1: invalid status transition completed -> processing"
        );
    }
}
