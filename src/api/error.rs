//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::pipeline::batch::BatchError;
use crate::pipeline::mapping::MappingError;
use crate::pipeline::state::StateError;
use crate::pipeline::validation::ValidationError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Missing X-Workspace-Id header")]
    MissingWorkspace,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::MissingWorkspace => (
                StatusCode::BAD_REQUEST,
                "WORKSPACE_REQUIRED",
                "X-Workspace-Id header is required".to_string(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Validation(detail) => ApiError::BadRequest(detail),
            BatchError::NotFound(id) => ApiError::NotFound(format!("Batch {id} not found")),
            BatchError::DocumentNotFound(id) => {
                ApiError::NotFound(format!("Document {id} not found"))
            }
            BatchError::State(e) => state_error(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::NotFound(id) => {
                ApiError::NotFound(format!("Extraction {id} not found"))
            }
            ValidationError::Conflict(detail) => ApiError::Conflict(detail),
            ValidationError::State(e) => state_error(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MappingError> for ApiError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::InvalidTemplate(detail) => ApiError::BadRequest(detail),
            MappingError::Database(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                ApiError::NotFound(format!("{entity_type} {id} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn state_error(err: StateError) -> ApiError {
    match err {
        StateError::IllegalTransition { from, to } => {
            ApiError::Conflict(format!("illegal transition from {from} to {to}"))
        }
        StateError::NotFound(id) => ApiError::NotFound(format!("Document {id} not found")),
        StateError::Database(e) => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn bad_request_returns_400() {
        let response = ApiError::BadRequest("batch of 51 files".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "batch of 51 files");
    }

    #[tokio::test]
    async fn conflict_returns_409() {
        let response = ApiError::Conflict("already approved".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("db exploded".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn missing_workspace_names_the_header() {
        let response = ApiError::MissingWorkspace.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "WORKSPACE_REQUIRED");
    }

    #[tokio::test]
    async fn batch_validation_maps_to_400() {
        let api: ApiError = BatchError::Validation("too many files".into()).into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn validation_conflict_maps_to_409() {
        let api: ApiError = ValidationError::Conflict("already rejected".into()).into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
