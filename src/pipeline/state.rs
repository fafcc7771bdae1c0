//! Document state machine.
//!
//! Drives a single document through
//! uploaded → parsing → parsed → extracting → extracted → validated →
//! {approved | rejected}, with `error` reachable from any non-terminal
//! state. Transitions are one-directional except two explicit,
//! operator-driven loops: rejected → extracted (re-extraction requested)
//! and error → parsing (manual retry).
//!
//! Every persisted status change goes through [`advance`] or [`fail`],
//! which use a compare-and-swap UPDATE so concurrent writers can never
//! interleave partial updates or regress a document.

use rusqlite::{params, Connection};
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::get_document;
use crate::db::DatabaseError;
use crate::models::enums::DocumentStatus;
use crate::models::Document;

/// Error cause recorded when the extraction service call times out,
/// distinct from parse and validation failures.
pub const CAUSE_EXTRACTION_TIMEOUT: &str = "extraction_timeout";

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Document {0} not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// The legal transition table.
pub fn can_transition(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::*;
    match (from, to) {
        (Uploaded, Parsing) => true,
        (Parsing, Parsed) => true,
        (Parsed, Extracting) => true,
        (Extracting, Extracted) => true,
        (Extracted, Validated) => true,
        (Validated, Approved) | (Validated, Rejected) => true,
        // Re-extraction of a rejected document, on explicit request
        (Rejected, Extracted) => true,
        // Manual operator retry re-enters at parsing
        (Error, Parsing) => true,
        // Error is reachable from any non-terminal state
        (from, Error) => !from.is_terminal(),
        _ => false,
    }
}

/// Advance a document to `to`, enforcing the transition table.
///
/// The UPDATE is guarded on the expected current status; if another writer
/// moved the document first, the reloaded state decides whether the
/// transition is still legal.
pub fn advance(
    conn: &Connection,
    document_id: &Uuid,
    to: DocumentStatus,
) -> Result<Document, StateError> {
    debug_assert!(to != DocumentStatus::Error, "use fail() for error transitions");
    loop {
        let current = get_document(conn, document_id)?
            .ok_or(StateError::NotFound(*document_id))?;

        if !can_transition(current.status, to) {
            return Err(StateError::IllegalTransition {
                from: current.status,
                to,
            });
        }

        let changed = conn.execute(
            "UPDATE documents SET status = ?2, error_cause = NULL WHERE id = ?1 AND status = ?3",
            params![
                document_id.to_string(),
                to.as_str(),
                current.status.as_str()
            ],
        ).map_err(DatabaseError::from)?;

        if changed > 0 {
            tracing::debug!(
                document_id = %document_id,
                from = current.status.as_str(),
                to = to.as_str(),
                "Document transition"
            );
            return Ok(Document {
                status: to,
                error_cause: None,
                ..current
            });
        }
        // Lost the race; reload and re-validate.
    }
}

/// Transition a document into `error` with a required human-readable cause.
///
/// The original file and any partial extraction are retained for audit and
/// manual retry.
pub fn fail(
    conn: &Connection,
    document_id: &Uuid,
    cause: &str,
) -> Result<Document, StateError> {
    loop {
        let current = get_document(conn, document_id)?
            .ok_or(StateError::NotFound(*document_id))?;

        if !can_transition(current.status, DocumentStatus::Error) {
            return Err(StateError::IllegalTransition {
                from: current.status,
                to: DocumentStatus::Error,
            });
        }

        let changed = conn.execute(
            "UPDATE documents SET status = 'error', error_cause = ?2 WHERE id = ?1 AND status = ?3",
            params![document_id.to_string(), cause, current.status.as_str()],
        ).map_err(DatabaseError::from)?;

        if changed > 0 {
            tracing::warn!(document_id = %document_id, cause, "Document failed");
            return Ok(Document {
                status: DocumentStatus::Error,
                error_cause: Some(cause.to_string()),
                ..current
            });
        }
    }
}

/// Operator-triggered retry of an errored document. Retries are manual
/// because failures are typically content-related, not transient.
pub fn retry(conn: &Connection, document_id: &Uuid) -> Result<Document, StateError> {
    advance(conn, document_id, DocumentStatus::Parsing)
}

/// Loop a rejected document back for re-validation of its extraction.
pub fn request_reextraction(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Document, StateError> {
    advance(conn, document_id, DocumentStatus::Extracted)
}
