//! Validation queue — holds extraction results pending human approval and
//! gates every commit to the clinical tables.

pub mod queue;

pub use queue::{
    approve, list_pending, reject, request_reextraction, stats, ApproveOutcome,
    PendingExtractionView, ValidationStats,
};

use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::mapping::MappingError;
use crate::pipeline::state::StateError;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Extraction {0} not found")]
    NotFound(uuid::Uuid),

    /// Decision conflicts leave state unchanged: double approval,
    /// rejecting twice, deciding on a document that is not awaiting
    /// validation.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),
}
