use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentType, FieldType, ReferenceSet, TransformationType};
use super::WorkspaceId;

/// Named, ordered set of field mappings applied to one document type.
///
/// Operator-edited configuration; read-only during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTemplate {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub document_type: DocumentType,
    pub auto_populate: bool,
    pub require_validation: bool,
    pub active: bool,
    pub created_at: NaiveDateTime,
    /// Sorted ascending by `processing_order` on load.
    pub mappings: Vec<FieldMapping>,
}

/// Rule converting one extracted field (or set of fields) into one target
/// clinical-table field via a transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub id: Uuid,
    pub template_id: Uuid,
    pub source_section: String,
    pub source_field: String,
    pub target_table: String,
    pub target_field: String,
    pub transformation_type: TransformationType,
    pub field_type: FieldType,
    pub is_required: bool,
    /// Lower runs first. Mappings with dependent transformations
    /// (`calculation`) must order strictly after the mappings supplying
    /// their inputs — enforced at template save time.
    pub processing_order: i32,
    pub config: MappingConfig,
}

/// Per-transformation configuration carried as JSON on the mapping row.
/// Unused fields stay at their defaults for the other transformation types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// `split`: delimiter between parts (e.g. "/" for "120/80").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    /// `split`: target column per part, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_fields: Vec<String>,
    /// `concatenation`: source fields within `source_section`, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_fields: Vec<String>,
    /// `concatenation`: separator between joined parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// `calculation`: operation name (`bmi`, `sum`, `difference`,
    /// `product`, `ratio`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// `calculation`: inputs as `table.field` references to
    /// already-computed target fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// `lookup`/`ai_match`: which reference code set to match against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceSet>,
    /// `ai_match`: per-mapping confidence floor override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_floor: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_config_default_is_empty_json() {
        let config = MappingConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn mapping_config_split_round_trip() {
        let config = MappingConfig {
            delimiter: Some("/".to_string()),
            target_fields: vec!["systolic".to_string(), "diastolic".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: MappingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn mapping_config_tolerates_unknown_defaults() {
        let parsed: MappingConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.delimiter.is_none());
        assert!(parsed.target_fields.is_empty());
        assert!(parsed.inputs.is_empty());
    }
}
