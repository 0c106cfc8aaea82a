//! HTTP handlers for upload intake and check status.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use codecheck_core::{Check, CheckId, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Multipart field carrying the uploaded file.
pub const FILE_FIELD: &str = "codeFile";
/// Accepted alias of [`FILE_FIELD`].
pub const FILE_FIELD_ALIAS: &str = "file";

const UPLOAD_MESSAGE: &str = "File uploaded successfully. CI/CD check initiated.";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub check_id: CheckId,
    pub file_name: String,
    pub status_url: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Upload exceeds the size limit")
    } else {
        ApiError::bad_request(format!("Malformed upload: {}", err.body_text()))
    }
}

/// `POST /api/upload`
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if !matches!(field.name(), Some(FILE_FIELD | FILE_FIELD_ALIAS)) {
            debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or(ValidationError::MissingFile)?;
    state.policy.validate(&file_name, bytes.len() as u64)?;

    let staged = state
        .stager
        .stage(&file_name, bytes.to_vec())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to stage upload: {e}")))?;
    let submission = state.orchestrator.submit(staged).await?;

    Ok(Json(UploadResponse {
        check_id: submission.check_id,
        file_name: submission.file_name,
        status_url: submission.status_url,
        message: UPLOAD_MESSAGE.to_string(),
    }))
}

/// `GET /api/check/:id`
pub async fn get_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Check>> {
    let check = state.registry.get(&CheckId::from_external(id)).await?;
    Ok(Json(check))
}

/// `GET /api/checks?limit=N`
pub async fn list_checks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Check>> {
    let checks = match query.limit {
        Some(limit) => state.registry.list_recent(limit).await,
        None => state.registry.list().await,
    };
    Json(checks)
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        timestamp: Utc::now(),
    })
}
