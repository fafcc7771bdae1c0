use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

str_enum!(DocumentStatus {
    Uploaded => "uploaded",
    Parsing => "parsing",
    Parsed => "parsed",
    Extracting => "extracting",
    Extracted => "extracted",
    Validated => "validated",
    Approved => "approved",
    Rejected => "rejected",
    Error => "error",
});

impl DocumentStatus {
    /// Terminal statuses end a document's pipeline run and count toward
    /// batch completion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Error)
    }
}

str_enum!(DocumentType {
    Prescription => "prescription",
    LabReport => "lab_report",
    ImmunizationRecord => "immunization_record",
    ClinicalNote => "clinical_note",
    DischargeSummary => "discharge_summary",
    RadiologyReport => "radiology_report",
    Other => "other",
});

str_enum!(BatchStatus {
    Running => "running",
    Completed => "completed",
});

str_enum!(TransformationType {
    Direct => "direct",
    Lookup => "lookup",
    AiMatch => "ai_match",
    Split => "split",
    Concatenation => "concatenation",
    Calculation => "calculation",
});

str_enum!(FieldType {
    Text => "text",
    Number => "number",
    Date => "date",
    Datetime => "datetime",
    Boolean => "boolean",
    Json => "json",
});

str_enum!(DecisionAction {
    Approved => "approved",
    Rejected => "rejected",
});

str_enum!(MatchType {
    IdNumber => "id_number",
    NameDob => "name_dob",
    Fuzzy => "fuzzy",
    None => "none",
});

str_enum!(ReferenceSet {
    Icd10 => "icd10",
    Nappi => "nappi",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn document_status_round_trip() {
        for (variant, s) in [
            (DocumentStatus::Uploaded, "uploaded"),
            (DocumentStatus::Parsing, "parsing"),
            (DocumentStatus::Parsed, "parsed"),
            (DocumentStatus::Extracting, "extracting"),
            (DocumentStatus::Extracted, "extracted"),
            (DocumentStatus::Validated, "validated"),
            (DocumentStatus::Approved, "approved"),
            (DocumentStatus::Rejected, "rejected"),
            (DocumentStatus::Error, "error"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(DocumentStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(DocumentStatus::Approved.is_terminal());
        assert!(DocumentStatus::Rejected.is_terminal());
        assert!(DocumentStatus::Error.is_terminal());
        assert!(!DocumentStatus::Uploaded.is_terminal());
        assert!(!DocumentStatus::Extracted.is_terminal());
        assert!(!DocumentStatus::Validated.is_terminal());
    }

    #[test]
    fn transformation_type_round_trip() {
        for (variant, s) in [
            (TransformationType::Direct, "direct"),
            (TransformationType::Lookup, "lookup"),
            (TransformationType::AiMatch, "ai_match"),
            (TransformationType::Split, "split"),
            (TransformationType::Concatenation, "concatenation"),
            (TransformationType::Calculation, "calculation"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(TransformationType::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn field_type_round_trip() {
        for (variant, s) in [
            (FieldType::Text, "text"),
            (FieldType::Number, "number"),
            (FieldType::Date, "date"),
            (FieldType::Datetime, "datetime"),
            (FieldType::Boolean, "boolean"),
            (FieldType::Json, "json"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(FieldType::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn match_type_serde_snake_case() {
        let json = serde_json::to_string(&MatchType::IdNumber).unwrap();
        assert_eq!(json, "\"id_number\"");
        let parsed: MatchType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, MatchType::IdNumber);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(DocumentStatus::from_str("invalid").is_err());
        assert!(TransformationType::from_str("unknown").is_err());
        assert!(FieldType::from_str("").is_err());
    }
}
