//! Mapping engine — template-driven field mapping and transformation.
//!
//! `compute` turns canonical extraction sections into candidate rows for
//! the clinical target tables without writing anything; `commit` is the
//! only durable write step and is idempotent per extraction result.

pub mod coerce;
pub mod commit;
pub mod engine;
pub mod lookup;
pub mod transform;
pub mod validate;

pub use commit::{commit, CommitOutcome};
pub use engine::{MappingEngine, ComputeOutcome};
pub use lookup::ReferenceCache;
pub use validate::validate_template;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}
