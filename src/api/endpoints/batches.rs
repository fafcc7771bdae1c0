//! Batch submission, status polling, and manual document retry.

use std::str::FromStr;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Workspace};
use crate::models::enums::DocumentType;
use crate::pipeline::batch::{BatchStatusView, UploadFile};

#[derive(Serialize)]
pub struct SubmitResponse {
    pub batch_id: Uuid,
    pub status: &'static str,
    pub total_files: usize,
}

/// `POST /api/batches` — multipart upload of 1–50 files.
///
/// Text fields: `document_type` (optional, defaults to `other`),
/// `patient_id` (optional, links every file to a known patient). Every
/// part carrying a filename is treated as a file.
pub async fn submit(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut document_type = DocumentType::Other;
    let mut patient_id: Option<Uuid> = None;
    let mut files: Vec<UploadFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if let Some(filename) = field.file_name().map(String::from) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed reading {filename:?}: {e}")))?;
            files.push(UploadFile {
                filename,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        match field.name() {
            Some("document_type") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                document_type = DocumentType::from_str(value.trim())
                    .map_err(|_| ApiError::BadRequest(format!("unknown document_type: {value}")))?;
            }
            Some("patient_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                patient_id = Some(
                    Uuid::parse_str(value.trim())
                        .map_err(|_| ApiError::BadRequest(format!("invalid patient_id: {value}")))?,
                );
            }
            _ => {}
        }
    }

    let total_files = files.len();
    let batch_id = ctx
        .orchestrator
        .submit(&workspace, document_type, files, patient_id)
        .await?;

    Ok(Json(SubmitResponse {
        batch_id,
        status: "running",
        total_files,
    }))
}

/// `GET /api/batches/:id` — idempotent status snapshot for polling.
pub async fn status(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchStatusView>, ApiError> {
    let view = ctx.orchestrator.status(batch_id).await?;
    // Workspace scoping: a batch from another workspace is as good as
    // absent.
    let context = ctx.orchestrator.context();
    let owned = tokio::task::spawn_blocking(move || -> Result<bool, ApiError> {
        let conn = crate::db::sqlite::open_database(&context.db_path)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let batch = crate::db::repository::get_batch(&conn, &batch_id)
            .map_err(ApiError::from)?;
        Ok(batch.is_some_and(|b| b.workspace_id == workspace))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    if !owned {
        return Err(ApiError::NotFound(format!("Batch {batch_id} not found")));
    }
    Ok(Json(view))
}

/// `POST /api/documents/:id/retry` — operator-triggered retry of an
/// errored document.
pub async fn retry(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Path(document_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ctx.orchestrator.retry_document(&workspace, document_id).await?;
    Ok(Json(serde_json::json!({
        "document_id": document_id,
        "status": "parsing"
    })))
}
