//! API error types and HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use codecheck_core::{CheckId, OrchestratorError, RegistryError, ValidationError};
use serde::Serialize;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// JSON error body: `{ "error": ..., "code": ... }`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Human-readable message (safe for clients).
    pub error: String,
    /// Stable machine-readable error code.
    pub code: &'static str,
    /// Id of the check that was created before the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_id: Option<CheckId>,
}

/// HTTP API error with stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    check_id: Option<CheckId>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            check_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    /// Attach the id of the check this failure belongs to.
    #[must_use]
    pub fn with_check_id(mut self, check_id: CheckId) -> Self {
        self.check_id = Some(check_id);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.message,
            code: self.code,
            check_id: self.check_id,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::TooLarge { .. } => Self::payload_too_large(err.to_string()),
            ValidationError::MissingFile => {
                Self::new(StatusCode::BAD_REQUEST, "NO_FILE", err.to_string())
            }
            ValidationError::DisallowedExtension { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_FILE_TYPE", err.to_string())
            }
            ValidationError::EmptyFileName | ValidationError::InvalidFileName { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_FILE_NAME", err.to_string())
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { .. } => Self::not_found("Check not found"),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let check_id = err.check_id().clone();
        let mapped = match &err {
            OrchestratorError::Provisioning { .. } => Self::new(
                StatusCode::BAD_GATEWAY,
                "PROVISIONING_FAILED",
                format!("Failed to set up the CI repository: {}", err.summary()),
            ),
            OrchestratorError::Staging { .. } | OrchestratorError::Interrupted { .. } => {
                Self::internal(err.summary())
            }
            OrchestratorError::Closed { .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                err.summary(),
            ),
        };
        mapped.with_check_id(check_id)
    }
}
