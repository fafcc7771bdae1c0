//! The batch orchestrator.
//!
//! `submit` validates a whole upload, creates one document per file, and
//! fans the document pipelines out over a bounded worker pool. Workers own
//! their database connections; the extraction call is the only step that
//! blocks a worker for long. Status reads go through
//! [`super::progress::batch_status`] and never touch in-flight work.
//!
//! There is no hard cancel: a client that stops polling abandons the batch
//! client-side, while in-flight documents run to completion and their
//! results are still recorded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rusqlite::Connection;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::db::repository::{
    find_document_by_hash, get_document, get_extraction_by_document, insert_batch,
    insert_document, insert_extraction_result, mark_batch_completed_if_done,
    set_document_patient,
};
use crate::db::sqlite::open_database;
use crate::models::enums::{BatchStatus, DocumentStatus, DocumentType};
use crate::models::{BatchJob, Document, ExtractionResult, WorkspaceId};
use crate::pipeline::extract::{ExtractionError, ExtractionRequest, ExtractionService};
use crate::pipeline::mapping::{commit, MappingEngine, ReferenceCache};
use crate::pipeline::matcher::{parse_demographics, match_patient};
use crate::pipeline::state::{self, CAUSE_EXTRACTION_TIMEOUT};

use super::progress::{batch_status, BatchStatusView};
use super::upload::{stage_file, validate_batch, UploadFile};
use super::BatchError;

/// Everything a document pipeline needs, shared across workers.
pub struct PipelineContext {
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub service: Arc<dyn ExtractionService>,
    /// Read-only reference codes, shared without locking.
    pub refs: Arc<ReferenceCache>,
    pub config: PipelineConfig,
}

pub struct BatchOrchestrator {
    ctx: Arc<PipelineContext>,
    workers: Arc<Semaphore>,
}

impl BatchOrchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        let permits = ctx.config.worker_concurrency.max(1);
        Self {
            ctx: Arc::new(ctx),
            workers: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn context(&self) -> Arc<PipelineContext> {
        self.ctx.clone()
    }

    /// Submit 1–50 files as one batch. Validation is all-or-nothing: on
    /// any violation no batch and no documents are created.
    pub async fn submit(
        &self,
        workspace: &WorkspaceId,
        document_type: DocumentType,
        files: Vec<UploadFile>,
        patient_id: Option<Uuid>,
    ) -> Result<Uuid, BatchError> {
        let validated = validate_batch(&files, &self.ctx.config)?;

        let ctx = self.ctx.clone();
        let ws = workspace.clone();
        let (batch_id, document_ids) = tokio::task::spawn_blocking(move || {
            create_batch_records(&ctx, &ws, document_type, validated, patient_id)
        })
        .await
        .map_err(|e| BatchError::Storage(e.to_string()))??;

        tracing::info!(
            batch_id = %batch_id,
            files = document_ids.len(),
            workspace = %workspace,
            "Batch submitted"
        );

        for document_id in document_ids {
            self.spawn_pipeline(document_id);
        }

        Ok(batch_id)
    }

    /// Queue one document pipeline on the worker pool.
    fn spawn_pipeline(&self, document_id: Uuid) {
        let ctx = self.ctx.clone();
        let workers = self.workers.clone();
        tokio::spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let join = tokio::task::spawn_blocking(move || {
                run_document_pipeline(&ctx, &document_id);
            })
            .await;
            if let Err(e) = join {
                tracing::error!(document_id = %document_id, error = %e, "Worker panicked");
            }
        });
    }

    /// Operator-triggered retry of an errored document. Re-enters the
    /// pipeline at `parsing`; only documents that failed before their
    /// extraction result exists can rerun.
    pub async fn retry_document(
        &self,
        workspace: &WorkspaceId,
        document_id: Uuid,
    ) -> Result<(), BatchError> {
        let ctx = self.ctx.clone();
        let ws = workspace.clone();
        tokio::task::spawn_blocking(move || -> Result<(), BatchError> {
            let conn = open_database(&ctx.db_path)?;
            let doc = get_document(&conn, &document_id)?
                .filter(|d| d.workspace_id == ws)
                .ok_or(BatchError::DocumentNotFound(document_id))?;
            if get_extraction_by_document(&conn, &document_id)?.is_some() {
                return Err(BatchError::Validation(
                    "document already has an extraction result; decide it in the validation queue"
                        .to_string(),
                ));
            }
            state::retry(&conn, &doc.id)?;
            Ok(())
        })
        .await
        .map_err(|e| BatchError::Storage(e.to_string()))??;

        self.spawn_pipeline(document_id);
        Ok(())
    }

    /// Idempotent snapshot read for polling clients.
    pub async fn status(&self, batch_id: Uuid) -> Result<BatchStatusView, BatchError> {
        let ctx = self.ctx.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_database(&ctx.db_path)?;
            batch_status(&conn, &batch_id)
        })
        .await
        .map_err(|e| BatchError::Storage(e.to_string()))?
    }
}

/// Create the batch row and one `uploaded` document per validated file.
fn create_batch_records(
    ctx: &PipelineContext,
    workspace: &WorkspaceId,
    document_type: DocumentType,
    validated: Vec<super::upload::ValidatedUpload>,
    patient_id: Option<Uuid>,
) -> Result<(Uuid, Vec<Uuid>), BatchError> {
    let conn = open_database(&ctx.db_path)?;

    let batch = BatchJob {
        id: Uuid::new_v4(),
        workspace_id: workspace.clone(),
        status: BatchStatus::Running,
        total_files: validated.len() as u32,
        created_at: chrono::Utc::now().naive_utc(),
        completed_at: None,
    };
    insert_batch(&conn, &batch)?;

    let mut document_ids = Vec::with_capacity(validated.len());
    for file in validated {
        let document_id = Uuid::new_v4();
        let staged = stage_file(&ctx.storage_dir, &document_id, &file.filename, &file.bytes)?;
        let duplicate_of =
            find_document_by_hash(&conn, workspace, &file.content_hash)?.map(|d| d.id);
        if let Some(original) = duplicate_of {
            tracing::info!(
                document_id = %document_id,
                original = %original,
                "Upload duplicates existing document content"
            );
        }

        let document = Document {
            id: document_id,
            workspace_id: workspace.clone(),
            batch_id: batch.id,
            filename: file.filename,
            content_path: staged.to_string_lossy().into_owned(),
            content_hash: file.content_hash,
            mime_type: file.mime_type.to_string(),
            size_bytes: file.bytes.len() as u64,
            document_type,
            status: DocumentStatus::Uploaded,
            error_cause: None,
            duplicate_of,
            patient_id,
            encounter_id: None,
            uploaded_at: chrono::Utc::now().naive_utc(),
            deleted_at: None,
        };
        insert_document(&conn, &document)?;
        document_ids.push(document_id);
    }

    Ok((batch.id, document_ids))
}

/// Drive one document from `uploaded` to `extracted` (or a terminal state).
/// Never propagates: every failure lands the document in `error` with a
/// cause, and only that document fails — never the batch.
pub fn run_document_pipeline(ctx: &PipelineContext, document_id: &Uuid) {
    match drive_document(ctx, document_id) {
        Ok(()) => {}
        Err(e) => {
            tracing::error!(document_id = %document_id, error = %e, "Document pipeline error");
            if let Ok(conn) = open_database(&ctx.db_path) {
                let _ = state::fail(&conn, document_id, &format!("internal error: {e}"));
                if let Ok(Some(doc)) = get_document(&conn, document_id) {
                    let _ = mark_batch_completed_if_done(&conn, &doc.batch_id);
                }
            }
        }
    }
}

fn drive_document(ctx: &PipelineContext, document_id: &Uuid) -> Result<(), BatchError> {
    let mut conn = open_database(&ctx.db_path)?;
    let started = Instant::now();

    let doc = get_document(&conn, document_id)?.ok_or_else(|| {
        BatchError::Storage(format!("document {document_id} disappeared before processing"))
    })?;

    // Parse: the staged file must be readable and look like what it
    // claimed to be at upload. A retried document re-enters already in
    // `parsing`.
    if doc.status == DocumentStatus::Uploaded {
        state::advance(&conn, document_id, DocumentStatus::Parsing)?;
    } else if doc.status != DocumentStatus::Parsing {
        return Err(BatchError::Storage(format!(
            "document {document_id} is {}, not runnable",
            doc.status
        )));
    }
    let bytes = match std::fs::read(&doc.content_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            state::fail(&conn, document_id, &format!("parse failure: {e}"))?;
            mark_batch_completed_if_done(&conn, &doc.batch_id)?;
            return Ok(());
        }
    };
    if super::upload::detect_mime(&bytes).is_none() {
        state::fail(&conn, document_id, "parse failure: unrecognized file content")?;
        mark_batch_completed_if_done(&conn, &doc.batch_id)?;
        return Ok(());
    }
    state::advance(&conn, document_id, DocumentStatus::Parsed)?;

    // Extract: the long blocking call. Timeout gets its own cause.
    state::advance(&conn, document_id, DocumentStatus::Extracting)?;
    let request = ExtractionRequest {
        content: &bytes,
        mime_type: &doc.mime_type,
        document_type: doc.document_type,
    };
    let outcome = match ctx.service.extract(&request) {
        Ok(outcome) => outcome,
        Err(ExtractionError::Timeout) => {
            state::fail(&conn, document_id, CAUSE_EXTRACTION_TIMEOUT)?;
            mark_batch_completed_if_done(&conn, &doc.batch_id)?;
            return Ok(());
        }
        Err(e) => {
            state::fail(&conn, document_id, &format!("extraction failed: {e}"))?;
            mark_batch_completed_if_done(&conn, &doc.batch_id)?;
            return Ok(());
        }
    };
    state::advance(&conn, document_id, DocumentStatus::Extracted)?;

    // Resolve the patient before mapping so committed rows attribute to it.
    let patient_id = resolve_patient(&conn, &doc, &outcome.sections, &ctx.config)?;
    if let Some(patient_id) = &patient_id {
        set_document_patient(&conn, document_id, patient_id)?;
    }

    // Compute candidates; no durable write happens here.
    let template = crate::db::repository::find_active_template(
        &conn,
        &doc.workspace_id,
        doc.document_type,
    )?;
    let computed = match &template {
        Some(template) if template.auto_populate => {
            let engine = MappingEngine::new(
                ctx.service.as_ref(),
                &ctx.refs,
                ctx.config.ai_match_floor,
            );
            engine.compute(&outcome.sections, template)
        }
        _ => Default::default(),
    };

    let extraction = ExtractionResult {
        id: Uuid::new_v4(),
        document_id: *document_id,
        workspace_id: doc.workspace_id.clone(),
        sections: outcome.sections,
        section_confidence: outcome.section_confidence,
        fields_extracted: computed.fields_extracted,
        records_created: 0,
        population_errors: computed.errors,
        candidate_records: computed.candidates,
        processing_ms: started.elapsed().as_millis() as u64,
        created_at: chrono::Utc::now().naive_utc(),
        committed_at: None,
        committed_record_ids: None,
        validated_by: None,
        rejection_reason: None,
    };
    insert_extraction_result(&conn, &extraction)?;

    tracing::info!(
        document_id = %document_id,
        fields = extraction.fields_extracted,
        candidates = extraction.candidate_records.len(),
        population_errors = extraction.population_errors.len(),
        duration_ms = extraction.processing_ms,
        "Document extracted"
    );

    // Templates that waive validation auto-commit straight through;
    // everything else waits in the validation queue.
    if let Some(template) = &template {
        if template.auto_populate && !template.require_validation {
            state::advance(&conn, document_id, DocumentStatus::Validated)?;
            state::advance(&conn, document_id, DocumentStatus::Approved)?;
            let stored = get_extraction_by_document(&conn, document_id)?
                .unwrap_or(extraction);
            let commit_outcome = commit(&mut conn, &stored, patient_id.as_ref())
                .map_err(|e| BatchError::Storage(e.to_string()))?;
            if !commit_outcome.errors.is_empty() {
                crate::db::repository::append_population_errors(
                    &conn,
                    &stored.id,
                    &commit_outcome.errors,
                )?;
            }
        }
    }

    mark_batch_completed_if_done(&conn, &doc.batch_id)?;
    Ok(())
}

/// Use parsed demographics to attach a patient: explicit id from the
/// submission wins, then the matcher, then new-patient creation.
fn resolve_patient(
    conn: &Connection,
    doc: &Document,
    sections: &serde_json::Value,
    config: &PipelineConfig,
) -> Result<Option<Uuid>, BatchError> {
    if doc.patient_id.is_some() {
        return Ok(doc.patient_id);
    }

    let Some(demographics) = parse_demographics(sections) else {
        return Ok(None);
    };

    let matched = match_patient(conn, &doc.workspace_id, &demographics, config.fuzzy_match_floor)?;
    if matched.match_found {
        tracing::debug!(
            document_id = %doc.id,
            match_type = matched.match_type.as_str(),
            confidence = matched.confidence,
            "Patient matched"
        );
        return Ok(matched.patient_id);
    }

    let patient = crate::db::repository::create_patient_from_demographics(
        conn,
        &doc.workspace_id,
        &demographics,
    )?;
    tracing::info!(
        document_id = %doc.id,
        patient_id = %patient.id,
        "No patient match, created new patient"
    );
    Ok(Some(patient.id))
}
