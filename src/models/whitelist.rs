//! Fixed whitelist of clinical target tables and their known fields.
//!
//! Template configuration is validated against this list at save time, so
//! mapping application never encounters an unknown table or column.

/// A clinical table auto-population may write into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicalTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

pub const CLINICAL_TABLES: &[ClinicalTable] = &[
    ClinicalTable {
        name: "immunizations",
        columns: &[
            "vaccine_name",
            "vaccine_code",
            "dose_number",
            "administered_date",
            "administered_by",
            "batch_number",
        ],
    },
    ClinicalTable {
        name: "lab_results",
        columns: &[
            "test_name",
            "test_code",
            "value",
            "value_text",
            "unit",
            "reference_range",
            "abnormal_flag",
            "collection_date",
        ],
    },
    ClinicalTable {
        name: "prescriptions",
        columns: &[
            "medication_name",
            "nappi_code",
            "dose",
            "frequency",
            "route",
            "duration",
            "prescribed_date",
            "prescriber",
        ],
    },
    ClinicalTable {
        name: "diagnoses",
        columns: &[
            "description",
            "icd10_code",
            "diagnosed_date",
            "status",
        ],
    },
    ClinicalTable {
        name: "vital_signs",
        columns: &[
            "systolic",
            "diastolic",
            "pulse",
            "temperature",
            "respiratory_rate",
            "oxygen_saturation",
            "weight_kg",
            "height_cm",
            "bmi",
            "recorded_at",
        ],
    },
];

/// Look up a whitelisted table by name.
pub fn find_table(name: &str) -> Option<&'static ClinicalTable> {
    CLINICAL_TABLES.iter().find(|t| t.name == name)
}

/// True if `table.field` names a whitelisted column.
pub fn is_known_field(table: &str, field: &str) -> bool {
    find_table(table).is_some_and(|t| t.columns.contains(&field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tables_resolve() {
        assert!(find_table("vital_signs").is_some());
        assert!(find_table("immunizations").is_some());
        assert!(find_table("billing_lines").is_none());
    }

    #[test]
    fn known_field_check() {
        assert!(is_known_field("vital_signs", "systolic"));
        assert!(is_known_field("diagnoses", "icd10_code"));
        assert!(!is_known_field("vital_signs", "shoe_size"));
        assert!(!is_known_field("unknown_table", "systolic"));
    }
}
