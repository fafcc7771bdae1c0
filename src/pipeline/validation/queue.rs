//! Queue operations: list, approve, reject, stats.
//!
//! Decisions are append-only audit events. A prior decision is never
//! overwritten — re-deciding inserts a new record referencing the one it
//! supersedes. Approval is the only trigger for the mapping engine's
//! commit step; rejection never commits.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::{
    append_population_errors, count_pending_extractions, get_document, get_extraction_result,
    insert_decision, latest_decision, latest_decision_counts, list_pending_extractions,
    mark_batch_completed_if_done, stamp_rejection, stamp_validated_by,
};
use crate::models::enums::{DecisionAction, DocumentStatus, DocumentType};
use crate::models::{
    CandidateRecord, ExtractionResult, PopulationError, ValidationDecision, WorkspaceId,
};
use crate::pipeline::mapping::commit;
use crate::pipeline::state;

use super::ValidationError;

/// One pending extraction, enriched for the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingExtractionView {
    pub extraction_id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub document_type: DocumentType,
    pub sections: serde_json::Value,
    pub section_confidence: std::collections::BTreeMap<String, f32>,
    /// Sections whose confidence sits below the flagging threshold.
    pub flagged_sections: Vec<String>,
    /// Surfaced before approval so nothing is committed without
    /// visibility into what was skipped.
    pub population_errors: Vec<PopulationError>,
    pub candidate_records: Vec<CandidateRecord>,
    pub created_at: NaiveDateTime,
}

/// Queue counters for a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationStats {
    pub pending: u32,
    pub approved: u32,
    pub rejected: u32,
    /// approved / (approved + rejected); pending is excluded from the
    /// denominator.
    pub approval_rate: f32,
}

/// What an approval did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveOutcome {
    pub extraction_id: Uuid,
    pub record_ids: Vec<Uuid>,
    /// Commit-time failures recorded as non-fatal population errors.
    pub population_errors: Vec<PopulationError>,
    /// True when a prior approval had already committed this extraction.
    pub already_committed: bool,
}

/// Extractions awaiting a first decision, oldest first.
pub fn list_pending(
    conn: &Connection,
    workspace: &WorkspaceId,
    limit: usize,
    confidence_flag_threshold: f32,
) -> Result<Vec<PendingExtractionView>, ValidationError> {
    let mut views = Vec::new();
    for extraction in list_pending_extractions(conn, workspace, limit)? {
        let document = get_document(conn, &extraction.document_id)?
            .ok_or(ValidationError::NotFound(extraction.id))?;
        let flagged_sections = extraction
            .section_confidence
            .iter()
            .filter(|(_, confidence)| **confidence < confidence_flag_threshold)
            .map(|(section, _)| section.clone())
            .collect();
        views.push(PendingExtractionView {
            extraction_id: extraction.id,
            document_id: document.id,
            filename: document.filename,
            document_type: document.document_type,
            sections: extraction.sections,
            section_confidence: extraction.section_confidence,
            flagged_sections,
            population_errors: extraction.population_errors,
            candidate_records: extraction.candidate_records,
            created_at: extraction.created_at,
        });
    }
    Ok(views)
}

/// Approve an extraction: append the decision, advance the document to
/// `approved`, and commit candidate records.
///
/// Partial commit failures do not undo the approval — data already
/// captured is kept and the failures surface as population errors.
pub fn approve(
    conn: &mut Connection,
    workspace: &WorkspaceId,
    extraction_id: &Uuid,
    validated_by: &str,
    notes: Option<&str>,
) -> Result<ApproveOutcome, ValidationError> {
    let (extraction, document) = load_for_decision(conn, workspace, extraction_id)?;

    let prior = latest_decision(conn, extraction_id)?;
    if let Some(prior) = &prior {
        if prior.action == DecisionAction::Approved {
            return Err(ValidationError::Conflict(
                "extraction is already approved".to_string(),
            ));
        }
    }
    ensure_awaiting_validation(&document)?;

    insert_decision(
        conn,
        &ValidationDecision {
            id: Uuid::new_v4(),
            extraction_id: *extraction_id,
            workspace_id: workspace.clone(),
            action: DecisionAction::Approved,
            decided_by: validated_by.to_string(),
            notes: notes.map(String::from),
            supersedes: prior.map(|d| d.id),
            decided_at: chrono::Utc::now().naive_utc(),
        },
    )?;
    stamp_validated_by(conn, extraction_id, validated_by)?;

    state::advance(conn, &document.id, DocumentStatus::Validated)?;
    state::advance(conn, &document.id, DocumentStatus::Approved)?;

    let commit_outcome = commit(conn, &extraction, document.patient_id.as_ref())?;
    if !commit_outcome.errors.is_empty() {
        append_population_errors(conn, extraction_id, &commit_outcome.errors)?;
    }

    mark_batch_completed_if_done(conn, &document.batch_id)?;

    tracing::info!(
        extraction_id = %extraction_id,
        validated_by,
        records = commit_outcome.record_ids.len(),
        "Extraction approved"
    );

    Ok(ApproveOutcome {
        extraction_id: *extraction_id,
        record_ids: commit_outcome.record_ids,
        population_errors: commit_outcome.errors,
        already_committed: commit_outcome.already_committed,
    })
}

/// Reject an extraction. Terminal for the document and never commits.
pub fn reject(
    conn: &mut Connection,
    workspace: &WorkspaceId,
    extraction_id: &Uuid,
    reason: &str,
    validated_by: &str,
) -> Result<(), ValidationError> {
    let (_, document) = load_for_decision(conn, workspace, extraction_id)?;

    let prior = latest_decision(conn, extraction_id)?;
    if let Some(prior) = &prior {
        match prior.action {
            DecisionAction::Rejected => {
                return Err(ValidationError::Conflict(
                    "extraction is already rejected".to_string(),
                ))
            }
            DecisionAction::Approved => {
                return Err(ValidationError::Conflict(
                    "cannot reject an approved extraction".to_string(),
                ))
            }
        }
    }
    ensure_awaiting_validation(&document)?;

    insert_decision(
        conn,
        &ValidationDecision {
            id: Uuid::new_v4(),
            extraction_id: *extraction_id,
            workspace_id: workspace.clone(),
            action: DecisionAction::Rejected,
            decided_by: validated_by.to_string(),
            notes: Some(reason.to_string()),
            supersedes: prior.map(|d| d.id),
            decided_at: chrono::Utc::now().naive_utc(),
        },
    )?;
    stamp_rejection(conn, extraction_id, validated_by, reason)?;

    state::advance(conn, &document.id, DocumentStatus::Validated)?;
    state::advance(conn, &document.id, DocumentStatus::Rejected)?;

    mark_batch_completed_if_done(conn, &document.batch_id)?;

    tracing::info!(extraction_id = %extraction_id, validated_by, reason, "Extraction rejected");
    Ok(())
}

/// Loop a rejected extraction's document back to `extracted` so it can be
/// re-validated. The next decision will supersede the rejection.
pub fn request_reextraction(
    conn: &Connection,
    workspace: &WorkspaceId,
    extraction_id: &Uuid,
) -> Result<(), ValidationError> {
    let (_, document) = load_for_decision(conn, workspace, extraction_id)?;
    if document.status != DocumentStatus::Rejected {
        return Err(ValidationError::Conflict(format!(
            "document is {}, only rejected documents can re-enter validation",
            document.status
        )));
    }
    state::request_reextraction(conn, &document.id)?;
    tracing::info!(extraction_id = %extraction_id, "Rejected extraction re-entered validation");
    Ok(())
}

/// Queue statistics. `pending` never enters the approval-rate denominator.
pub fn stats(conn: &Connection, workspace: &WorkspaceId) -> Result<ValidationStats, ValidationError> {
    let pending = count_pending_extractions(conn, workspace)?;
    let (approved, rejected) = latest_decision_counts(conn, workspace)?;
    let decided = approved + rejected;
    let approval_rate = if decided == 0 {
        0.0
    } else {
        approved as f32 / decided as f32
    };
    Ok(ValidationStats {
        pending,
        approved,
        rejected,
        approval_rate,
    })
}

fn load_for_decision(
    conn: &Connection,
    workspace: &WorkspaceId,
    extraction_id: &Uuid,
) -> Result<(ExtractionResult, crate::models::Document), ValidationError> {
    let extraction = get_extraction_result(conn, extraction_id)?
        .filter(|e| &e.workspace_id == workspace)
        .ok_or(ValidationError::NotFound(*extraction_id))?;
    let document = get_document(conn, &extraction.document_id)?
        .ok_or(ValidationError::NotFound(*extraction_id))?;
    Ok((extraction, document))
}

fn ensure_awaiting_validation(document: &crate::models::Document) -> Result<(), ValidationError> {
    if document.status != DocumentStatus::Extracted {
        return Err(ValidationError::Conflict(format!(
            "document is {}, not awaiting validation",
            document.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{
        count_clinical_rows, get_batch, insert_batch, insert_document, insert_extraction_result,
    };
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::BatchStatus;
    use crate::models::{BatchJob, Document};
    use std::collections::BTreeMap;

    fn seed_pending(conn: &Connection, workspace: &str) -> (Uuid, Uuid, Uuid) {
        let batch = BatchJob {
            id: Uuid::new_v4(),
            workspace_id: WorkspaceId::from(workspace),
            status: BatchStatus::Running,
            total_files: 1,
            created_at: chrono::Utc::now().naive_utc(),
            completed_at: None,
        };
        insert_batch(conn, &batch).unwrap();

        let doc = Document {
            id: Uuid::new_v4(),
            workspace_id: WorkspaceId::from(workspace),
            batch_id: batch.id,
            filename: "note.pdf".to_string(),
            content_path: "/tmp/note.pdf".to_string(),
            content_hash: Uuid::new_v4().to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 64,
            document_type: DocumentType::ClinicalNote,
            status: DocumentStatus::Extracted,
            error_cause: None,
            duplicate_of: None,
            patient_id: None,
            encounter_id: None,
            uploaded_at: chrono::Utc::now().naive_utc(),
            deleted_at: None,
        };
        insert_document(conn, &doc).unwrap();

        let mut confidence = BTreeMap::new();
        confidence.insert("vitals".to_string(), 0.95);
        confidence.insert("notes".to_string(), 0.41);

        let mut fields = BTreeMap::new();
        fields.insert("systolic".to_string(), serde_json::json!(120.0));
        fields.insert("diastolic".to_string(), serde_json::json!(80.0));

        let extraction = ExtractionResult {
            id: Uuid::new_v4(),
            document_id: doc.id,
            workspace_id: WorkspaceId::from(workspace),
            sections: serde_json::json!({"vitals": {"blood_pressure": "120/80"}}),
            section_confidence: confidence,
            fields_extracted: 2,
            records_created: 0,
            population_errors: vec![],
            candidate_records: vec![CandidateRecord {
                target_table: "vital_signs".to_string(),
                fields,
            }],
            processing_ms: 900,
            created_at: chrono::Utc::now().naive_utc(),
            committed_at: None,
            committed_record_ids: None,
            validated_by: None,
            rejection_reason: None,
        };
        insert_extraction_result(conn, &extraction).unwrap();
        (batch.id, doc.id, extraction.id)
    }

    #[test]
    fn list_flags_low_confidence_sections() {
        let conn = open_memory_database().unwrap();
        let ws = WorkspaceId::from("ws-1");
        seed_pending(&conn, "ws-1");

        let pending = list_pending(&conn, &ws, 10, 0.70).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].flagged_sections, vec!["notes".to_string()]);
        assert_eq!(pending[0].filename, "note.pdf");
    }

    #[test]
    fn approve_commits_and_terminates_document() {
        let mut conn = open_memory_database().unwrap();
        let ws = WorkspaceId::from("ws-1");
        let (batch_id, doc_id, extraction_id) = seed_pending(&conn, "ws-1");

        let outcome = approve(&mut conn, &ws, &extraction_id, "dr.naidoo", Some("checked")).unwrap();

        assert_eq!(outcome.record_ids.len(), 1);
        assert!(!outcome.already_committed);
        assert_eq!(count_clinical_rows(&conn, "vital_signs").unwrap(), 1);

        let doc = get_document(&conn, &doc_id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Approved);

        // Last child turned terminal, so the batch completed
        let batch = get_batch(&conn, &batch_id).unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);

        let extraction = get_extraction_result(&conn, &extraction_id).unwrap().unwrap();
        assert_eq!(extraction.validated_by.as_deref(), Some("dr.naidoo"));
        assert!(extraction.committed_at.is_some());
    }

    #[test]
    fn double_approval_conflicts_without_changes() {
        let mut conn = open_memory_database().unwrap();
        let ws = WorkspaceId::from("ws-1");
        let (_, _, extraction_id) = seed_pending(&conn, "ws-1");

        approve(&mut conn, &ws, &extraction_id, "dr.naidoo", None).unwrap();
        let second = approve(&mut conn, &ws, &extraction_id, "dr.naidoo", None);

        assert!(matches!(second, Err(ValidationError::Conflict(_))));
        // Target tables unchanged
        assert_eq!(count_clinical_rows(&conn, "vital_signs").unwrap(), 1);
    }

    #[test]
    fn reject_never_commits() {
        let mut conn = open_memory_database().unwrap();
        let ws = WorkspaceId::from("ws-1");
        let (batch_id, doc_id, extraction_id) = seed_pending(&conn, "ws-1");

        reject(&mut conn, &ws, &extraction_id, "illegible scan", "dr.naidoo").unwrap();

        // Zero new rows in any clinical table
        for table in ["vital_signs", "lab_results", "prescriptions", "diagnoses", "immunizations"] {
            assert_eq!(count_clinical_rows(&conn, table).unwrap(), 0, "{table} has rows");
        }

        let doc = get_document(&conn, &doc_id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Rejected);

        let extraction = get_extraction_result(&conn, &extraction_id).unwrap().unwrap();
        assert_eq!(extraction.rejection_reason.as_deref(), Some("illegible scan"));
        assert!(extraction.committed_at.is_none());

        // Rejection is terminal and counts toward batch completion
        let batch = get_batch(&conn, &batch_id).unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
    }

    #[test]
    fn approving_a_rejected_item_conflicts_until_reextraction() {
        let mut conn = open_memory_database().unwrap();
        let ws = WorkspaceId::from("ws-1");
        let (_, _, extraction_id) = seed_pending(&conn, "ws-1");

        reject(&mut conn, &ws, &extraction_id, "wrong patient", "dr.naidoo").unwrap();

        // Plain approve on a rejected item is a conflict, state unchanged
        let blocked = approve(&mut conn, &ws, &extraction_id, "dr.patel", None);
        assert!(matches!(blocked, Err(ValidationError::Conflict(_))));
        assert_eq!(count_clinical_rows(&conn, "vital_signs").unwrap(), 0);

        // After an explicit re-extraction request, approval goes through
        // and the new decision references the rejection it supersedes.
        request_reextraction(&conn, &ws, &extraction_id).unwrap();
        approve(&mut conn, &ws, &extraction_id, "dr.patel", None).unwrap();

        let history = crate::db::repository::decision_history(&conn, &extraction_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, DecisionAction::Approved);
        assert_eq!(history[1].supersedes, Some(history[0].id));
    }

    #[test]
    fn reextracted_item_reappears_in_pending_list() {
        let mut conn = open_memory_database().unwrap();
        let ws = WorkspaceId::from("ws-1");
        let (_, _, extraction_id) = seed_pending(&conn, "ws-1");

        reject(&mut conn, &ws, &extraction_id, "wrong template", "dr.naidoo").unwrap();
        assert!(list_pending(&conn, &ws, 10, 0.70).unwrap().is_empty());

        request_reextraction(&conn, &ws, &extraction_id).unwrap();
        let pending = list_pending(&conn, &ws, 10, 0.70).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].extraction_id, extraction_id);
    }

    #[test]
    fn reapproval_after_commit_is_idempotent() {
        let mut conn = open_memory_database().unwrap();
        let ws = WorkspaceId::from("ws-1");
        let (_, _, extraction_id) = seed_pending(&conn, "ws-1");

        let first = approve(&mut conn, &ws, &extraction_id, "dr.naidoo", None).unwrap();

        // Force the document back around the loop to re-approve the same
        // extraction; commit must be a no-op with identical row ids.
        let doc_id = get_extraction_result(&conn, &extraction_id)
            .unwrap()
            .unwrap()
            .document_id;
        conn.execute(
            "UPDATE documents SET status = 'extracted' WHERE id = ?1",
            [doc_id.to_string()],
        )
        .unwrap();
        conn.execute("DELETE FROM validation_decisions", []).unwrap();

        let second = approve(&mut conn, &ws, &extraction_id, "dr.naidoo", None).unwrap();
        assert!(second.already_committed);
        assert_eq!(second.record_ids, first.record_ids);
        assert_eq!(count_clinical_rows(&conn, "vital_signs").unwrap(), 1);
    }

    #[test]
    fn stats_exclude_pending_from_rate() {
        let mut conn = open_memory_database().unwrap();
        let ws = WorkspaceId::from("ws-1");
        let (_, _, first) = seed_pending(&conn, "ws-1");
        let (_, _, second) = seed_pending(&conn, "ws-1");
        seed_pending(&conn, "ws-1"); // stays pending

        approve(&mut conn, &ws, &first, "dr.naidoo", None).unwrap();
        reject(&mut conn, &ws, &second, "blurry", "dr.naidoo").unwrap();

        let stats = stats(&conn, &ws).unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 1);
        assert!((stats.approval_rate - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_stats_rate_is_zero() {
        let conn = open_memory_database().unwrap();
        let stats = stats(&conn, &WorkspaceId::from("ws-1")).unwrap();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.approval_rate, 0.0);
    }

    #[test]
    fn workspace_isolation() {
        let mut conn = open_memory_database().unwrap();
        let (_, _, extraction_id) = seed_pending(&conn, "ws-1");

        let other = approve(&mut conn, &WorkspaceId::from("ws-2"), &extraction_id, "x", None);
        assert!(matches!(other, Err(ValidationError::NotFound(_))));
    }
}
