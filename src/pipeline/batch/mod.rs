//! Batch orchestration — fans out one document pipeline per uploaded file
//! over a bounded worker pool and exposes a monotonic progress snapshot to
//! polling clients.

pub mod orchestrator;
pub mod progress;
pub mod upload;

pub use orchestrator::{BatchOrchestrator, PipelineContext};
pub use progress::{batch_status, BatchStatusView, FileStatusView};
pub use upload::{UploadFile, ValidatedUpload};

use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::state::StateError;

#[derive(Error, Debug)]
pub enum BatchError {
    /// Input error: the whole submission is rejected before any document
    /// is created.
    #[error("Invalid batch: {0}")]
    Validation(String),

    #[error("Batch {0} not found")]
    NotFound(uuid::Uuid),

    #[error("Document {0} not found")]
    DocumentNotFound(uuid::Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Storage error: {0}")]
    Storage(String),
}
