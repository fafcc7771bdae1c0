//! Validation queue endpoints: list, approve, reject, stats,
//! re-extraction.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Workspace};
use crate::db::sqlite::open_database;
use crate::models::WorkspaceId;
use crate::pipeline::validation::{
    self, ApproveOutcome, PendingExtractionView, ValidationStats,
};

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// `GET /api/validation` — pending extractions for review.
pub async fn list(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PendingExtractionView>>, ApiError> {
    let context = ctx.orchestrator.context();
    let views = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = open_database(&context.db_path).map_err(ApiError::from)?;
        validation::list_pending(
            &conn,
            &workspace,
            query.limit.min(200),
            context.config.confidence_flag_threshold,
        )
        .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(views))
}

/// `GET /api/validation/stats` — queue counters and approval rate.
pub async fn stats(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
) -> Result<Json<ValidationStats>, ApiError> {
    let context = ctx.orchestrator.context();
    let stats = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = open_database(&context.db_path).map_err(ApiError::from)?;
        validation::stats(&conn, &workspace).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub validated_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `POST /api/validation/:id/approve` — approve and commit.
pub async fn approve(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Path(extraction_id): Path<Uuid>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApproveOutcome>, ApiError> {
    require_actor(&request.validated_by)?;
    let context = ctx.orchestrator.context();
    let outcome = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let mut conn = open_database(&context.db_path).map_err(ApiError::from)?;
        validation::approve(
            &mut conn,
            &workspace,
            &extraction_id,
            &request.validated_by,
            request.notes.as_deref(),
        )
        .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub reason: String,
    pub validated_by: String,
}

/// `POST /api/validation/:id/reject` — reject; never commits.
pub async fn reject(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Path(extraction_id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_actor(&request.validated_by)?;
    if request.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("a rejection reason is required".into()));
    }
    let context = ctx.orchestrator.context();
    tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let mut conn = open_database(&context.db_path).map_err(ApiError::from)?;
        validation::reject(
            &mut conn,
            &workspace,
            &extraction_id,
            request.reason.trim(),
            &request.validated_by,
        )
        .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(serde_json::json!({
        "extraction_id": extraction_id,
        "status": "rejected"
    })))
}

/// `POST /api/validation/:id/reextract` — loop a rejected extraction back
/// into the queue; the next decision supersedes the rejection.
pub async fn reextract(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Path(extraction_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let context = ctx.orchestrator.context();
    reextract_blocking(context, workspace, extraction_id).await?;
    Ok(Json(serde_json::json!({
        "extraction_id": extraction_id,
        "status": "extracted"
    })))
}

async fn reextract_blocking(
    context: std::sync::Arc<crate::pipeline::batch::PipelineContext>,
    workspace: WorkspaceId,
    extraction_id: Uuid,
) -> Result<(), ApiError> {
    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        let conn = open_database(&context.db_path).map_err(ApiError::from)?;
        validation::request_reextraction(&conn, &workspace, &extraction_id).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
}

fn require_actor(validated_by: &str) -> Result<(), ApiError> {
    if validated_by.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "validated_by must identify the acting validator".into(),
        ));
    }
    Ok(())
}
