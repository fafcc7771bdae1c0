//! Extraction adapter — wraps the AI extraction service.
//!
//! Input is raw file bytes + document type; output is structured JSON
//! sections with per-section confidence. The service is opaque: everything
//! behind the `ExtractionService` trait is mockable.

pub mod client;
pub mod normalize;
pub mod types;

pub use client::HttpExtractionService;
pub use types::{ExtractionOutcome, ExtractionRequest, ExtractionService, MatchSuggestion};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction service error: {0}")]
    Http(String),

    #[error("Extraction timed out")]
    Timeout,

    #[error("Invalid extraction response: {0}")]
    InvalidResponse(String),

    #[error("Extraction service unavailable: {0}")]
    Unavailable(String),
}
