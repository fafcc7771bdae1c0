//! The document extraction and auto-population pipeline.
//!
//! Control flow: a batch submission fans out one document state machine
//! per file; each runs the extraction adapter, the mapping engine computes
//! candidate records (without committing), the result waits in the
//! validation queue, and approval triggers the commit to the clinical
//! tables.

pub mod batch;
pub mod extract;
pub mod mapping;
pub mod matcher;
pub mod state;
pub mod validation;
