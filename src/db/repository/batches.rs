use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{BatchStatus, DocumentStatus};
use crate::models::{BatchJob, BatchProgress, WorkspaceId};

use super::documents::{format_ts, parse_ts, parse_uuid};

pub fn insert_batch(conn: &Connection, batch: &BatchJob) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO batch_jobs (id, workspace_id, status, total_files, created_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            batch.id.to_string(),
            batch.workspace_id.as_str(),
            batch.status.as_str(),
            batch.total_files,
            format_ts(&batch.created_at),
            batch.completed_at.map(|t| format_ts(&t)),
        ],
    )?;
    Ok(())
}

pub fn get_batch(conn: &Connection, id: &Uuid) -> Result<Option<BatchJob>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, workspace_id, status, total_files, created_at, completed_at
         FROM batch_jobs WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u32>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    });

    match result {
        Ok((id, workspace_id, status, total_files, created_at, completed_at)) => {
            Ok(Some(BatchJob {
                id: parse_uuid(&id)?,
                workspace_id: WorkspaceId(workspace_id),
                status: BatchStatus::from_str(&status)?,
                total_files,
                created_at: parse_ts(&created_at),
                completed_at: completed_at.map(|s| parse_ts(&s)),
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Derive aggregate progress counters from child document statuses.
pub fn batch_progress(conn: &Connection, batch_id: &Uuid) -> Result<BatchProgress, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM documents WHERE batch_id = ?1 GROUP BY status")?;

    let rows = stmt.query_map(params![batch_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
    })?;

    let mut progress = BatchProgress::default();
    for row in rows {
        let (status, count) = row?;
        let status = DocumentStatus::from_str(&status)?;
        for _ in 0..count {
            progress.add(status);
        }
    }
    Ok(progress)
}

/// Flip a batch to `completed` iff every child document is terminal.
///
/// The guarded UPDATE makes completion idempotent: a second report of the
/// same child's terminal status can never double-complete or regress the
/// batch. Returns true only on the transition that actually completed it.
pub fn mark_batch_completed_if_done(
    conn: &Connection,
    batch_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE batch_jobs SET status = 'completed', completed_at = datetime('now')
         WHERE id = ?1 AND status = 'running'
           AND NOT EXISTS (
               SELECT 1 FROM documents
               WHERE batch_id = ?1
                 AND status NOT IN ('approved', 'rejected', 'error')
           )",
        params![batch_id.to_string()],
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_document, update_document_status};
    use crate::db::sqlite::open_memory_database;
    use crate::models::Document;
    use crate::models::enums::DocumentType;

    fn seed_batch_with_docs(conn: &Connection, count: usize) -> (Uuid, Vec<Uuid>) {
        let batch = BatchJob {
            id: Uuid::new_v4(),
            workspace_id: WorkspaceId::from("ws-1"),
            status: BatchStatus::Running,
            total_files: count as u32,
            created_at: chrono::Utc::now().naive_utc(),
            completed_at: None,
        };
        insert_batch(conn, &batch).unwrap();

        let mut doc_ids = Vec::new();
        for i in 0..count {
            let doc = Document {
                id: Uuid::new_v4(),
                workspace_id: WorkspaceId::from("ws-1"),
                batch_id: batch.id,
                filename: format!("file-{i}.pdf"),
                content_path: format!("/tmp/file-{i}.pdf"),
                content_hash: format!("hash-{i}"),
                mime_type: "application/pdf".to_string(),
                size_bytes: 100,
                document_type: DocumentType::Other,
                status: DocumentStatus::Uploaded,
                error_cause: None,
                duplicate_of: None,
                patient_id: None,
                encounter_id: None,
                uploaded_at: chrono::Utc::now().naive_utc(),
                deleted_at: None,
            };
            insert_document(conn, &doc).unwrap();
            doc_ids.push(doc.id);
        }
        (batch.id, doc_ids)
    }

    #[test]
    fn progress_counts_by_bucket() {
        let conn = open_memory_database().unwrap();
        let (batch_id, doc_ids) = seed_batch_with_docs(&conn, 3);

        update_document_status(&conn, &doc_ids[0], DocumentStatus::Extracting, None).unwrap();
        update_document_status(&conn, &doc_ids[1], DocumentStatus::Approved, None).unwrap();

        let progress = batch_progress(&conn, &batch_id).unwrap();
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.processing, 1);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 0);
    }

    #[test]
    fn not_completed_while_children_in_flight() {
        let conn = open_memory_database().unwrap();
        let (batch_id, doc_ids) = seed_batch_with_docs(&conn, 2);

        update_document_status(&conn, &doc_ids[0], DocumentStatus::Approved, None).unwrap();

        assert!(!mark_batch_completed_if_done(&conn, &batch_id).unwrap());
        let batch = get_batch(&conn, &batch_id).unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Running);
    }

    #[test]
    fn completes_exactly_once() {
        let conn = open_memory_database().unwrap();
        let (batch_id, doc_ids) = seed_batch_with_docs(&conn, 2);

        update_document_status(&conn, &doc_ids[0], DocumentStatus::Approved, None).unwrap();
        update_document_status(&conn, &doc_ids[1], DocumentStatus::Error, Some("parse failure"))
            .unwrap();

        assert!(mark_batch_completed_if_done(&conn, &batch_id).unwrap());
        // A duplicate terminal report must not complete it twice
        assert!(!mark_batch_completed_if_done(&conn, &batch_id).unwrap());

        let batch = get_batch(&conn, &batch_id).unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert!(batch.completed_at.is_some());
    }
}
