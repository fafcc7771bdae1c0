//! The commit step — the only durable write in the mapping engine.
//!
//! Idempotent per extraction result: the commit marker on
//! `extraction_results` guarantees a re-approval returns the originally
//! committed row ids instead of inserting duplicates. The whole step runs
//! in one transaction, so concurrent commits serialize on the marker.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::{get_extraction_result, insert_clinical_row, mark_committed};
use crate::db::DatabaseError;
use crate::models::{ExtractionResult, PopulationError};

use super::MappingError;

/// What a commit produced.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub record_ids: Vec<Uuid>,
    /// Per-record insert failures. Non-fatal: rows already captured are
    /// kept and the approval stands.
    pub errors: Vec<PopulationError>,
    /// True when the commit marker was already set and nothing was written.
    pub already_committed: bool,
}

/// Commit an extraction's candidate records to the clinical tables.
pub fn commit(
    conn: &mut Connection,
    extraction: &ExtractionResult,
    patient_id: Option<&Uuid>,
) -> Result<CommitOutcome, MappingError> {
    let tx = conn.transaction().map_err(DatabaseError::from)?;

    // Re-read under the transaction: the caller's snapshot may predate a
    // concurrent commit.
    let current = get_extraction_result(&tx, &extraction.id)?
        .ok_or_else(|| {
            MappingError::Database(DatabaseError::NotFound {
                entity_type: "ExtractionResult".into(),
                id: extraction.id.to_string(),
            })
        })?;

    if current.committed_at.is_some() {
        tx.commit().map_err(DatabaseError::from)?;
        return Ok(CommitOutcome {
            record_ids: current.committed_record_ids.unwrap_or_default(),
            errors: Vec::new(),
            already_committed: true,
        });
    }

    let mut record_ids = Vec::with_capacity(current.candidate_records.len());
    let mut errors = Vec::new();

    for candidate in &current.candidate_records {
        match insert_clinical_row(
            &tx,
            &candidate.target_table,
            &current.workspace_id,
            patient_id,
            &current.id,
            &candidate.fields,
        ) {
            Ok(row_id) => record_ids.push(row_id),
            Err(e) => {
                tracing::warn!(
                    extraction_id = %current.id,
                    target_table = candidate.target_table,
                    error = %e,
                    "Commit failed for one candidate record"
                );
                errors.push(PopulationError::new(
                    ("", ""),
                    (&candidate.target_table, ""),
                    format!("commit failed: {e}"),
                    None,
                ));
            }
        }
    }

    mark_committed(&tx, &current.id, &record_ids, record_ids.len() as u32)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        extraction_id = %current.id,
        records = record_ids.len(),
        failures = errors.len(),
        "Extraction committed"
    );

    Ok(CommitOutcome {
        record_ids,
        errors,
        already_committed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{
        count_clinical_rows, insert_batch, insert_document, insert_extraction_result,
    };
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{BatchStatus, DocumentStatus, DocumentType};
    use crate::models::{BatchJob, CandidateRecord, Document, WorkspaceId};
    use std::collections::BTreeMap;

    fn seed_extraction(conn: &Connection, candidates: Vec<CandidateRecord>) -> ExtractionResult {
        let batch = BatchJob {
            id: Uuid::new_v4(),
            workspace_id: WorkspaceId::from("ws-1"),
            status: BatchStatus::Running,
            total_files: 1,
            created_at: chrono::Utc::now().naive_utc(),
            completed_at: None,
        };
        insert_batch(conn, &batch).unwrap();
        let doc = Document {
            id: Uuid::new_v4(),
            workspace_id: WorkspaceId::from("ws-1"),
            batch_id: batch.id,
            filename: "scan.pdf".to_string(),
            content_path: "/tmp/scan.pdf".to_string(),
            content_hash: Uuid::new_v4().to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 100,
            document_type: DocumentType::Other,
            status: DocumentStatus::Extracted,
            error_cause: None,
            duplicate_of: None,
            patient_id: None,
            encounter_id: None,
            uploaded_at: chrono::Utc::now().naive_utc(),
            deleted_at: None,
        };
        insert_document(conn, &doc).unwrap();

        let extraction = ExtractionResult {
            id: Uuid::new_v4(),
            document_id: doc.id,
            workspace_id: WorkspaceId::from("ws-1"),
            sections: serde_json::json!({}),
            section_confidence: BTreeMap::new(),
            fields_extracted: 0,
            records_created: 0,
            population_errors: vec![],
            candidate_records: candidates,
            processing_ms: 0,
            created_at: chrono::Utc::now().naive_utc(),
            committed_at: None,
            committed_record_ids: None,
            validated_by: None,
            rejection_reason: None,
        };
        insert_extraction_result(conn, &extraction).unwrap();
        extraction
    }

    fn vitals_candidate() -> CandidateRecord {
        let mut fields = BTreeMap::new();
        fields.insert("systolic".to_string(), serde_json::json!(120.0));
        fields.insert("diastolic".to_string(), serde_json::json!(80.0));
        CandidateRecord {
            target_table: "vital_signs".to_string(),
            fields,
        }
    }

    fn diagnosis_candidate() -> CandidateRecord {
        let mut fields = BTreeMap::new();
        fields.insert("description".to_string(), serde_json::json!("Asthma"));
        fields.insert("icd10_code".to_string(), serde_json::json!("J45.9"));
        CandidateRecord {
            target_table: "diagnoses".to_string(),
            fields,
        }
    }

    #[test]
    fn commits_all_candidates() {
        let mut conn = open_memory_database().unwrap();
        let extraction = seed_extraction(&conn, vec![vitals_candidate(), diagnosis_candidate()]);

        let outcome = commit(&mut conn, &extraction, None).unwrap();

        assert!(!outcome.already_committed);
        assert_eq!(outcome.record_ids.len(), 2);
        assert!(outcome.errors.is_empty());
        assert_eq!(count_clinical_rows(&conn, "vital_signs").unwrap(), 1);
        assert_eq!(count_clinical_rows(&conn, "diagnoses").unwrap(), 1);
    }

    #[test]
    fn recommit_is_noop_with_same_ids() {
        let mut conn = open_memory_database().unwrap();
        let extraction = seed_extraction(&conn, vec![vitals_candidate()]);

        let first = commit(&mut conn, &extraction, None).unwrap();
        let second = commit(&mut conn, &extraction, None).unwrap();

        assert!(second.already_committed);
        assert_eq!(second.record_ids, first.record_ids);
        // No duplicate rows
        assert_eq!(count_clinical_rows(&conn, "vital_signs").unwrap(), 1);
    }

    #[test]
    fn partial_failure_keeps_captured_rows() {
        let mut conn = open_memory_database().unwrap();
        let bad = CandidateRecord {
            // Not whitelisted — insert fails, the other record still lands
            target_table: "billing_lines".to_string(),
            fields: BTreeMap::new(),
        };
        let extraction = seed_extraction(&conn, vec![vitals_candidate(), bad]);

        let outcome = commit(&mut conn, &extraction, None).unwrap();

        assert_eq!(outcome.record_ids.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].message.contains("commit failed"));
        assert_eq!(count_clinical_rows(&conn, "vital_signs").unwrap(), 1);
    }

    #[test]
    fn patient_id_attributed_to_rows() {
        let mut conn = open_memory_database().unwrap();
        let extraction = seed_extraction(&conn, vec![vitals_candidate()]);
        let patient_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO patients (id, workspace_id, first_name, last_name, created_at)
             VALUES (?1, 'ws-1', 'Thandi', 'Mokoena', datetime('now'))",
            [patient_id.to_string()],
        )
        .unwrap();

        commit(&mut conn, &extraction, Some(&patient_id)).unwrap();

        let stored: String = conn
            .query_row("SELECT patient_id FROM vital_signs LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored, patient_id.to_string());
    }
}
