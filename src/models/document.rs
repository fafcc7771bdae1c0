use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentStatus, DocumentType};
use super::WorkspaceId;

/// A single uploaded document moving through the pipeline.
///
/// Mutated only by the document state machine; soft-deleted (never removed)
/// while an approved extraction references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub batch_id: Uuid,
    pub filename: String,
    pub content_path: String,
    pub content_hash: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    /// Human-readable cause, set only when `status` is `error`.
    pub error_cause: Option<String>,
    /// Earlier document in the same workspace with identical content hash.
    pub duplicate_of: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub encounter_id: Option<Uuid>,
    pub uploaded_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}
