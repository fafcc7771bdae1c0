use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{BatchStatus, DocumentStatus};
use super::WorkspaceId;

/// A client-submitted group of documents processed together.
///
/// Becomes `completed` only when every child document reaches a terminal
/// status (approved, rejected, or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub status: BatchStatus,
    pub total_files: u32,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

/// Aggregate progress counters derived from child document statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub pending: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
}

impl BatchProgress {
    /// Bucket a document status into a progress counter.
    ///
    /// `rejected` counts as completed (the pipeline ran to a human
    /// decision); only `error` counts as failed.
    pub fn bucket(status: DocumentStatus) -> ProgressBucket {
        match status {
            DocumentStatus::Uploaded => ProgressBucket::Pending,
            DocumentStatus::Approved | DocumentStatus::Rejected => ProgressBucket::Completed,
            DocumentStatus::Error => ProgressBucket::Failed,
            _ => ProgressBucket::Processing,
        }
    }

    pub fn add(&mut self, status: DocumentStatus) {
        match Self::bucket(status) {
            ProgressBucket::Pending => self.pending += 1,
            ProgressBucket::Processing => self.processing += 1,
            ProgressBucket::Completed => self.completed += 1,
            ProgressBucket::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.pending + self.processing + self.completed + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressBucket {
    Pending,
    Processing,
    Completed,
    Failed,
}
