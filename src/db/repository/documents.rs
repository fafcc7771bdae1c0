use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{DocumentStatus, DocumentType};
use crate::models::{Document, WorkspaceId};

const DOCUMENT_COLUMNS: &str = "id, workspace_id, batch_id, filename, content_path, content_hash,
     mime_type, size_bytes, document_type, status, error_cause, duplicate_of,
     patient_id, encounter_id, uploaded_at, deleted_at";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, workspace_id, batch_id, filename, content_path, content_hash,
         mime_type, size_bytes, document_type, status, error_cause, duplicate_of,
         patient_id, encounter_id, uploaded_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            doc.id.to_string(),
            doc.workspace_id.as_str(),
            doc.batch_id.to_string(),
            doc.filename,
            doc.content_path,
            doc.content_hash,
            doc.mime_type,
            doc.size_bytes as i64,
            doc.document_type.as_str(),
            doc.status.as_str(),
            doc.error_cause,
            doc.duplicate_of.map(|id| id.to_string()),
            doc.patient_id.map(|id| id.to_string()),
            doc.encounter_id.map(|id| id.to_string()),
            format_ts(&doc.uploaded_at),
            doc.deleted_at.map(|t| format_ts(&t)),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Earlier non-deleted document in the workspace with the same content hash.
pub fn find_document_by_hash(
    conn: &Connection,
    workspace: &WorkspaceId,
    hash: &str,
) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE workspace_id = ?1 AND content_hash = ?2 AND deleted_at IS NULL
         ORDER BY uploaded_at ASC LIMIT 1"
    ))?;

    let result = stmt.query_row(params![workspace.as_str(), hash], row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn documents_for_batch(
    conn: &Connection,
    batch_id: &Uuid,
) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE batch_id = ?1 ORDER BY uploaded_at ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![batch_id.to_string()], row_from_rusqlite)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

/// Persist a status change. Used only by the document state machine, which
/// enforces transition legality before calling this.
pub fn update_document_status(
    conn: &Connection,
    id: &Uuid,
    status: DocumentStatus,
    error_cause: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE documents SET status = ?2, error_cause = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), error_cause],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn set_document_patient(
    conn: &Connection,
    id: &Uuid,
    patient_id: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE documents SET patient_id = ?2 WHERE id = ?1",
        params![id.to_string(), patient_id.to_string()],
    )?;
    Ok(())
}

pub fn set_document_duplicate_of(
    conn: &Connection,
    id: &Uuid,
    original: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE documents SET duplicate_of = ?2 WHERE id = ?1",
        params![id.to_string(), original.to_string()],
    )?;
    Ok(())
}

/// Soft-delete only. Documents referenced by an approved extraction must
/// stay queryable for audit; there is no hard delete.
pub fn soft_delete_document(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE documents SET deleted_at = datetime('now') WHERE id = ?1 AND deleted_at IS NULL",
        params![id.to_string()],
    )?;
    Ok(())
}

pub(crate) fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}

// Internal row type for Document mapping
struct DocumentRow {
    id: String,
    workspace_id: String,
    batch_id: String,
    filename: String,
    content_path: String,
    content_hash: String,
    mime_type: String,
    size_bytes: i64,
    document_type: String,
    status: String,
    error_cause: Option<String>,
    duplicate_of: Option<String>,
    patient_id: Option<String>,
    encounter_id: Option<String>,
    uploaded_at: String,
    deleted_at: Option<String>,
}

fn row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<DocumentRow, rusqlite::Error> {
    Ok(DocumentRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        batch_id: row.get(2)?,
        filename: row.get(3)?,
        content_path: row.get(4)?,
        content_hash: row.get(5)?,
        mime_type: row.get(6)?,
        size_bytes: row.get(7)?,
        document_type: row.get(8)?,
        status: row.get(9)?,
        error_cause: row.get(10)?,
        duplicate_of: row.get(11)?,
        patient_id: row.get(12)?,
        encounter_id: row.get(13)?,
        uploaded_at: row.get(14)?,
        deleted_at: row.get(15)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: parse_uuid(&row.id)?,
        workspace_id: WorkspaceId(row.workspace_id),
        batch_id: parse_uuid(&row.batch_id)?,
        filename: row.filename,
        content_path: row.content_path,
        content_hash: row.content_hash,
        mime_type: row.mime_type,
        size_bytes: row.size_bytes.max(0) as u64,
        document_type: DocumentType::from_str(&row.document_type)?,
        status: DocumentStatus::from_str(&row.status)?,
        error_cause: row.error_cause,
        duplicate_of: row.duplicate_of.and_then(|s| Uuid::parse_str(&s).ok()),
        patient_id: row.patient_id.and_then(|s| Uuid::parse_str(&s).ok()),
        encounter_id: row.encounter_id.and_then(|s| Uuid::parse_str(&s).ok()),
        uploaded_at: parse_ts(&row.uploaded_at),
        deleted_at: row.deleted_at.map(|s| parse_ts(&s)),
    })
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
