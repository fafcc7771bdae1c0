use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WorkspaceId;

/// Structured output of the extraction service for one document, plus the
/// mapping engine's computed candidates. 1:1 with a document.
///
/// Immutable after creation except the validation stamps
/// (`validated_by`/`rejection_reason`) and the commit marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub id: Uuid,
    pub document_id: Uuid,
    pub workspace_id: WorkspaceId,
    /// Sections keyed by canonical (lowercase, underscored) name.
    pub sections: serde_json::Value,
    /// Per-section confidence in [0, 1].
    pub section_confidence: BTreeMap<String, f32>,
    pub fields_extracted: u32,
    pub records_created: u32,
    pub population_errors: Vec<PopulationError>,
    /// Candidate rows computed by the mapping engine, committed only on
    /// approval.
    pub candidate_records: Vec<CandidateRecord>,
    pub processing_ms: u64,
    pub created_at: NaiveDateTime,
    /// Commit marker: set exactly once, makes re-commit a no-op.
    pub committed_at: Option<NaiveDateTime>,
    pub committed_record_ids: Option<Vec<Uuid>>,
    pub validated_by: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Append-only audit record of a human validation action.
///
/// A re-decision never overwrites: it inserts a new row with `supersedes`
/// pointing at the prior decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDecision {
    pub id: Uuid,
    pub extraction_id: Uuid,
    pub workspace_id: WorkspaceId,
    pub action: super::enums::DecisionAction,
    pub decided_by: String,
    pub notes: Option<String>,
    pub supersedes: Option<Uuid>,
    pub decided_at: NaiveDateTime,
}

/// A computed row for one clinical target table, awaiting commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub target_table: String,
    /// Coerced field values keyed by target column name.
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Non-fatal warning raised when a single field mapping fails.
/// Never aborts the document; surfaced to the validator before approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationError {
    pub source_section: String,
    pub source_field: String,
    pub target_table: String,
    pub target_field: String,
    pub message: String,
    /// Raw source text preserved for lookup misses and coercion failures.
    pub raw_value: Option<String>,
}

impl PopulationError {
    pub fn new(
        source: (&str, &str),
        target: (&str, &str),
        message: impl Into<String>,
        raw_value: Option<String>,
    ) -> Self {
        Self {
            source_section: source.0.to_string(),
            source_field: source.1.to_string(),
            target_table: target.0.to_string(),
            target_field: target.1.to_string(),
            message: message.into(),
            raw_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_error_serde_round_trip() {
        let err = PopulationError::new(
            ("vitals", "blood_pressure"),
            ("vital_signs", "systolic"),
            "malformed value",
            Some("one-twenty over eighty".to_string()),
        );
        let json = serde_json::to_string(&err).unwrap();
        let parsed: PopulationError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
        assert_eq!(parsed.raw_value.as_deref(), Some("one-twenty over eighty"));
    }

    #[test]
    fn candidate_record_preserves_field_order() {
        let mut fields = BTreeMap::new();
        fields.insert("systolic".to_string(), serde_json::json!(120.0));
        fields.insert("diastolic".to_string(), serde_json::json!(80.0));
        let record = CandidateRecord {
            target_table: "vital_signs".to_string(),
            fields,
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: CandidateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
