//! Progress snapshot for polling clients.
//!
//! A read never blocks on in-flight extraction: it queries the
//! last-committed document rows, which only ever advance. Polling is the
//! progress channel by design; there is no push notification and no hard
//! cancellation of in-flight work.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::{batch_progress, documents_for_batch, get_batch};
use crate::models::enums::{BatchStatus, DocumentStatus};
use crate::models::BatchProgress;

use super::BatchError;

/// Snapshot of a batch for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatusView {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub total_files: u32,
    pub progress: BatchProgress,
    pub files: Vec<FileStatusView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatusView {
    pub file_id: Uuid,
    pub filename: String,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_cause: Option<String>,
}

/// Assemble the monotonic status snapshot for one batch.
pub fn batch_status(conn: &Connection, batch_id: &Uuid) -> Result<BatchStatusView, BatchError> {
    let batch = get_batch(conn, batch_id)?.ok_or(BatchError::NotFound(*batch_id))?;
    let progress = batch_progress(conn, batch_id)?;
    let files = documents_for_batch(conn, batch_id)?
        .into_iter()
        .map(|doc| FileStatusView {
            file_id: doc.id,
            filename: doc.filename,
            status: doc.status,
            error_cause: doc.error_cause,
        })
        .collect();

    Ok(BatchStatusView {
        batch_id: batch.id,
        status: batch.status,
        total_files: batch.total_files,
        progress,
        files,
    })
}
