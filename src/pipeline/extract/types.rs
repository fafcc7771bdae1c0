use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::models::enums::{DocumentType, ReferenceSet};

/// A single extraction call: raw file bytes plus what the document claims
/// to be.
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub content: &'a [u8],
    pub mime_type: &'a str,
    pub document_type: DocumentType,
}

/// Structured output of one extraction call.
///
/// Section and field keys are canonical (lowercase, underscored) by the
/// time this leaves the adapter — see [`super::normalize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    /// JSON object keyed by section name.
    pub sections: serde_json::Value,
    /// Confidence per section in [0, 1].
    pub section_confidence: BTreeMap<String, f32>,
    /// Which model produced the extraction.
    pub model: String,
}

/// A code suggestion from the service's matching capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub code: String,
    pub description: String,
    pub confidence: f32,
}

/// AI extraction service abstraction (allows mocking).
///
/// Calls block for minutes; run them on a blocking-capable thread.
pub trait ExtractionService: Send + Sync {
    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<ExtractionOutcome, ExtractionError>;

    /// Delegate ambiguous code matching to the service. Returns None when
    /// the service has no suggestion.
    fn suggest_match(
        &self,
        raw_text: &str,
        reference: ReferenceSet,
    ) -> Result<Option<MatchSuggestion>, ExtractionError>;
}
