//! Key canonicalization at the adapter boundary.
//!
//! Raw service output mixes key casing ("Immunizations", "LAB_RESULTS",
//! "lab results"). Every consumer downstream assumes canonical keys, so the
//! adapter normalizes once here instead of call sites handling fallbacks.

use std::collections::BTreeMap;

/// Canonical form: trimmed, lowercase, spaces and hyphens as underscores.
pub fn canonicalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Recursively canonicalize every object key in a JSON value.
pub fn canonicalize_sections(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                out.insert(canonicalize_key(&key), canonicalize_sections(inner));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items.into_iter().map(canonicalize_sections).collect(),
        ),
        other => other,
    }
}

/// Canonicalize the keys of a confidence map.
pub fn canonicalize_confidence(map: BTreeMap<String, f32>) -> BTreeMap<String, f32> {
    map.into_iter()
        .map(|(key, confidence)| (canonicalize_key(&key), confidence.clamp(0.0, 1.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_forms_collapse() {
        assert_eq!(canonicalize_key("Immunizations"), "immunizations");
        assert_eq!(canonicalize_key("LAB_RESULTS"), "lab_results");
        assert_eq!(canonicalize_key("lab results"), "lab_results");
        assert_eq!(canonicalize_key(" Blood-Pressure "), "blood_pressure");
    }

    #[test]
    fn nested_objects_canonicalized() {
        let raw = serde_json::json!({
            "Immunizations": {
                "Vaccine Name": "MMR",
                "Dose Number": "2"
            },
            "LAB_RESULTS": [{"Test Name": "HbA1c"}]
        });

        let canonical = canonicalize_sections(raw);

        assert!(canonical.get("immunizations").is_some());
        assert_eq!(
            canonical["immunizations"]["vaccine_name"],
            serde_json::json!("MMR")
        );
        assert_eq!(
            canonical["lab_results"][0]["test_name"],
            serde_json::json!("HbA1c")
        );
    }

    #[test]
    fn values_left_untouched() {
        let raw = serde_json::json!({"Notes": "Patient REPORTS Improvement"});
        let canonical = canonicalize_sections(raw);
        assert_eq!(
            canonical["notes"],
            serde_json::json!("Patient REPORTS Improvement")
        );
    }

    #[test]
    fn confidence_clamped_and_canonicalized() {
        let mut map = BTreeMap::new();
        map.insert("Immunizations".to_string(), 1.4);
        map.insert("LAB RESULTS".to_string(), -0.1);

        let canonical = canonicalize_confidence(map);
        assert_eq!(canonical.get("immunizations"), Some(&1.0));
        assert_eq!(canonical.get("lab_results"), Some(&0.0));
    }
}
