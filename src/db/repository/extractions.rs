use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{CandidateRecord, ExtractionResult, PopulationError, WorkspaceId};

use super::documents::{format_ts, parse_ts, parse_uuid};

const EXTRACTION_COLUMNS: &str = "id, document_id, workspace_id, sections, section_confidence,
     fields_extracted, records_created, population_errors, candidate_records,
     processing_ms, created_at, committed_at, committed_record_ids, validated_by, rejection_reason";

pub fn insert_extraction_result(
    conn: &Connection,
    result: &ExtractionResult,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO extraction_results (id, document_id, workspace_id, sections, section_confidence,
         fields_extracted, records_created, population_errors, candidate_records,
         processing_ms, created_at, committed_at, committed_record_ids, validated_by, rejection_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            result.id.to_string(),
            result.document_id.to_string(),
            result.workspace_id.as_str(),
            result.sections.to_string(),
            to_json(&result.section_confidence)?,
            result.fields_extracted,
            result.records_created,
            to_json(&result.population_errors)?,
            to_json(&result.candidate_records)?,
            result.processing_ms as i64,
            format_ts(&result.created_at),
            result.committed_at.map(|t| format_ts(&t)),
            result
                .committed_record_ids
                .as_ref()
                .map(|ids| to_json(ids))
                .transpose()?,
            result.validated_by,
            result.rejection_reason,
        ],
    )?;
    Ok(())
}

pub fn get_extraction_result(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<ExtractionResult>, DatabaseError> {
    query_one(
        conn,
        &format!("SELECT {EXTRACTION_COLUMNS} FROM extraction_results WHERE id = ?1"),
        params![id.to_string()],
    )
}

pub fn get_extraction_by_document(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Option<ExtractionResult>, DatabaseError> {
    query_one(
        conn,
        &format!("SELECT {EXTRACTION_COLUMNS} FROM extraction_results WHERE document_id = ?1"),
        params![document_id.to_string()],
    )
}

/// Extractions awaiting validation, oldest first.
///
/// The document status is the authority: a document sitting in
/// `extracted` is awaiting a decision, including one looped back after a
/// rejection.
pub fn list_pending_extractions(
    conn: &Connection,
    workspace: &WorkspaceId,
    limit: usize,
) -> Result<Vec<ExtractionResult>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXTRACTION_COLUMNS} FROM extraction_results er
         WHERE er.workspace_id = ?1
           AND EXISTS (SELECT 1 FROM documents d
                       WHERE d.id = er.document_id
                         AND d.status = 'extracted'
                         AND d.deleted_at IS NULL)
         ORDER BY er.created_at ASC
         LIMIT ?2"
    ))?;

    let rows = stmt.query_map(params![workspace.as_str(), limit as i64], row_from_rusqlite)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(extraction_from_row(row?)?);
    }
    Ok(results)
}

/// Count of extractions awaiting validation.
pub fn count_pending_extractions(
    conn: &Connection,
    workspace: &WorkspaceId,
) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM extraction_results er
         WHERE er.workspace_id = ?1
           AND EXISTS (SELECT 1 FROM documents d
                       WHERE d.id = er.document_id
                         AND d.status = 'extracted'
                         AND d.deleted_at IS NULL)",
        params![workspace.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Record the validator identity on approval.
pub fn stamp_validated_by(
    conn: &Connection,
    id: &Uuid,
    validated_by: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE extraction_results SET validated_by = ?2 WHERE id = ?1",
        params![id.to_string(), validated_by],
    )?;
    Ok(())
}

/// Record the rejection reason alongside the validator identity.
pub fn stamp_rejection(
    conn: &Connection,
    id: &Uuid,
    validated_by: &str,
    reason: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE extraction_results SET validated_by = ?2, rejection_reason = ?3 WHERE id = ?1",
        params![id.to_string(), validated_by, reason],
    )?;
    Ok(())
}

/// Set the commit marker exactly once. Returns false if already committed,
/// in which case the stored record ids stand and no new write happened.
pub fn mark_committed(
    conn: &Connection,
    id: &Uuid,
    record_ids: &[Uuid],
    records_created: u32,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE extraction_results
         SET committed_at = datetime('now'), committed_record_ids = ?2, records_created = ?3
         WHERE id = ?1 AND committed_at IS NULL",
        params![id.to_string(), to_json(&record_ids.to_vec())?, records_created],
    )?;
    Ok(changed > 0)
}

/// Append population errors discovered after creation (e.g. partial commit
/// failures recorded on approval).
pub fn append_population_errors(
    conn: &Connection,
    id: &Uuid,
    new_errors: &[PopulationError],
) -> Result<(), DatabaseError> {
    if new_errors.is_empty() {
        return Ok(());
    }
    let existing: String = conn.query_row(
        "SELECT population_errors FROM extraction_results WHERE id = ?1",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    let mut errors: Vec<PopulationError> = serde_json::from_str(&existing).unwrap_or_default();
    errors.extend_from_slice(new_errors);
    conn.execute(
        "UPDATE extraction_results SET population_errors = ?2 WHERE id = ?1",
        params![id.to_string(), to_json(&errors)?],
    )?;
    Ok(())
}

fn query_one(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<ExtractionResult>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let result = stmt.query_row(params, row_from_rusqlite);
    match result {
        Ok(row) => Ok(Some(extraction_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// Internal row type for ExtractionResult mapping
struct ExtractionRow {
    id: String,
    document_id: String,
    workspace_id: String,
    sections: String,
    section_confidence: String,
    fields_extracted: u32,
    records_created: u32,
    population_errors: String,
    candidate_records: String,
    processing_ms: i64,
    created_at: String,
    committed_at: Option<String>,
    committed_record_ids: Option<String>,
    validated_by: Option<String>,
    rejection_reason: Option<String>,
}

fn row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ExtractionRow, rusqlite::Error> {
    Ok(ExtractionRow {
        id: row.get(0)?,
        document_id: row.get(1)?,
        workspace_id: row.get(2)?,
        sections: row.get(3)?,
        section_confidence: row.get(4)?,
        fields_extracted: row.get(5)?,
        records_created: row.get(6)?,
        population_errors: row.get(7)?,
        candidate_records: row.get(8)?,
        processing_ms: row.get(9)?,
        created_at: row.get(10)?,
        committed_at: row.get(11)?,
        committed_record_ids: row.get(12)?,
        validated_by: row.get(13)?,
        rejection_reason: row.get(14)?,
    })
}

fn extraction_from_row(row: ExtractionRow) -> Result<ExtractionResult, DatabaseError> {
    let section_confidence: BTreeMap<String, f32> =
        serde_json::from_str(&row.section_confidence).unwrap_or_default();
    let population_errors: Vec<PopulationError> =
        serde_json::from_str(&row.population_errors).unwrap_or_default();
    let candidate_records: Vec<CandidateRecord> =
        serde_json::from_str(&row.candidate_records).unwrap_or_default();
    let committed_record_ids: Option<Vec<Uuid>> = row
        .committed_record_ids
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok());

    Ok(ExtractionResult {
        id: parse_uuid(&row.id)?,
        document_id: parse_uuid(&row.document_id)?,
        workspace_id: WorkspaceId(row.workspace_id),
        sections: serde_json::from_str(&row.sections)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        section_confidence,
        fields_extracted: row.fields_extracted,
        records_created: row.records_created,
        population_errors,
        candidate_records,
        processing_ms: row.processing_ms.max(0) as u64,
        created_at: parse_ts(&row.created_at),
        committed_at: row.committed_at.map(|s| parse_ts(&s)),
        committed_record_ids,
        validated_by: row.validated_by,
        rejection_reason: row.rejection_reason,
    })
}
