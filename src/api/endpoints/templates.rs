//! Template and field-mapping configuration endpoints.
//!
//! Save-time validation rejects unknown target tables/fields and
//! calculation dependency violations, so pipeline execution never sees an
//! invalid template.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Workspace};
use crate::db::repository::{delete_template, get_template, insert_template, list_templates, update_template};
use crate::db::sqlite::open_database;
use crate::models::enums::{DocumentType, FieldType, TransformationType};
use crate::models::{ExtractionTemplate, FieldMapping, MappingConfig, WorkspaceId};
use crate::pipeline::mapping::validate::validate_template_or_error;

#[derive(Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    pub document_type: DocumentType,
    #[serde(default = "default_true")]
    pub auto_populate: bool,
    #[serde(default = "default_true")]
    pub require_validation: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    pub mappings: Vec<MappingRequest>,
}

#[derive(Deserialize)]
pub struct MappingRequest {
    pub source_section: String,
    #[serde(default)]
    pub source_field: String,
    pub target_table: String,
    pub target_field: String,
    pub transformation_type: TransformationType,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    pub processing_order: i32,
    #[serde(default)]
    pub config: MappingConfig,
}

fn default_true() -> bool {
    true
}

fn build_template(
    id: Uuid,
    workspace: &WorkspaceId,
    request: TemplateRequest,
) -> ExtractionTemplate {
    let mappings = request
        .mappings
        .into_iter()
        .map(|m| FieldMapping {
            id: Uuid::new_v4(),
            template_id: id,
            source_section: m.source_section,
            source_field: m.source_field,
            target_table: m.target_table,
            target_field: m.target_field,
            transformation_type: m.transformation_type,
            field_type: m.field_type,
            is_required: m.is_required,
            processing_order: m.processing_order,
            config: m.config,
        })
        .collect();
    ExtractionTemplate {
        id,
        workspace_id: workspace.clone(),
        name: request.name,
        document_type: request.document_type,
        auto_populate: request.auto_populate,
        require_validation: request.require_validation,
        active: request.active,
        created_at: chrono::Utc::now().naive_utc(),
        mappings,
    }
}

/// `GET /api/templates`
pub async fn list(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
) -> Result<Json<Vec<ExtractionTemplate>>, ApiError> {
    let context = ctx.orchestrator.context();
    let templates = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = open_database(&context.db_path).map_err(ApiError::from)?;
        list_templates(&conn, &workspace).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(templates))
}

/// `GET /api/templates/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Path(template_id): Path<Uuid>,
) -> Result<Json<ExtractionTemplate>, ApiError> {
    let context = ctx.orchestrator.context();
    let template = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = open_database(&context.db_path).map_err(ApiError::from)?;
        get_template(&conn, &template_id)
            .map_err(ApiError::from)?
            .filter(|t| t.workspace_id == workspace)
            .ok_or_else(|| ApiError::NotFound(format!("Template {template_id} not found")))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(template))
}

/// `POST /api/templates` — create, rejecting invalid configuration.
pub async fn create(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<ExtractionTemplate>, ApiError> {
    let template = build_template(Uuid::new_v4(), &workspace, request);
    validate_template_or_error(&template)?;

    let context = ctx.orchestrator.context();
    let created = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let mut conn = open_database(&context.db_path).map_err(ApiError::from)?;
        insert_template(&mut conn, &template).map_err(ApiError::from)?;
        Ok(template)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    tracing::info!(template_id = %created.id, name = created.name, "Template created");
    Ok(Json(created))
}

/// `PUT /api/templates/:id` — replace definition, re-validating.
pub async fn update(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Path(template_id): Path<Uuid>,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<ExtractionTemplate>, ApiError> {
    let template = build_template(template_id, &workspace, request);
    validate_template_or_error(&template)?;

    let context = ctx.orchestrator.context();
    let updated = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let mut conn = open_database(&context.db_path).map_err(ApiError::from)?;
        let existing = get_template(&conn, &template_id)
            .map_err(ApiError::from)?
            .filter(|t| t.workspace_id == workspace)
            .ok_or_else(|| ApiError::NotFound(format!("Template {template_id} not found")))?;
        let mut template = template;
        template.created_at = existing.created_at;
        update_template(&mut conn, &template).map_err(ApiError::from)?;
        Ok(template)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(updated))
}

/// `DELETE /api/templates/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Workspace(workspace): Workspace,
    Path(template_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let context = ctx.orchestrator.context();
    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        let conn = open_database(&context.db_path).map_err(ApiError::from)?;
        get_template(&conn, &template_id)
            .map_err(ApiError::from)?
            .filter(|t| t.workspace_id == workspace)
            .ok_or_else(|| ApiError::NotFound(format!("Template {template_id} not found")))?;
        delete_template(&conn, &template_id).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(serde_json::json!({ "deleted": template_id })))
}
