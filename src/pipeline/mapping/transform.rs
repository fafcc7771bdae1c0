//! The six mapping transformations.
//!
//! Each returns the produced (field, value) pairs or a failure message; the
//! engine turns failures into population errors and decides whether the
//! target table aborts.

use std::collections::BTreeMap;

use crate::models::enums::{FieldType, ReferenceSet};
use crate::pipeline::extract::ExtractionService;

use super::coerce::{coerce, coerce_number};
use super::lookup::ReferenceCache;

/// Resolve `section.field` inside canonical extraction sections.
/// A section holding an array of records reads from its first record.
pub fn source_value<'a>(
    sections: &'a serde_json::Value,
    section: &str,
    field: &str,
) -> Option<&'a serde_json::Value> {
    let section_value = sections.get(section)?;
    let record = match section_value {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    let value = record.get(field)?;
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

/// Render a raw value for preservation in a population error.
pub fn raw_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `direct`: copy the source value verbatim, coercing to the field type.
pub fn apply_direct(
    value: &serde_json::Value,
    field_type: FieldType,
    target_field: &str,
) -> Result<Vec<(String, serde_json::Value)>, String> {
    let coerced = coerce(value, field_type)?;
    Ok(vec![(target_field.to_string(), coerced)])
}

/// `split`: decompose one source value into multiple target fields using a
/// declared delimiter. Part count must match the declared targets.
pub fn apply_split(
    value: &serde_json::Value,
    delimiter: &str,
    target_fields: &[String],
    field_type: FieldType,
) -> Result<Vec<(String, serde_json::Value)>, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| format!("split input is not text: {value}"))?;

    let parts: Vec<&str> = raw.split(delimiter).map(str::trim).collect();
    if parts.len() != target_fields.len() {
        return Err(format!(
            "expected {} parts separated by {delimiter:?}, got {}",
            target_fields.len(),
            parts.len()
        ));
    }

    let mut out = Vec::with_capacity(parts.len());
    for (field, part) in target_fields.iter().zip(parts) {
        let coerced = coerce(&serde_json::Value::String(part.to_string()), field_type)?;
        out.push((field.clone(), coerced));
    }
    Ok(out)
}

/// `concatenation`: join multiple source fields into one target field.
pub fn apply_concatenation(
    sections: &serde_json::Value,
    section: &str,
    source_fields: &[String],
    separator: &str,
    target_field: &str,
) -> Result<Vec<(String, serde_json::Value)>, String> {
    let parts: Vec<String> = source_fields
        .iter()
        .filter_map(|field| source_value(sections, section, field))
        .map(raw_text)
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        return Err("no source fields present".to_string());
    }

    Ok(vec![(
        target_field.to_string(),
        serde_json::Value::String(parts.join(separator)),
    )])
}

/// `lookup`: exact or normalized-text match against a reference table.
pub fn apply_lookup(
    cache: &ReferenceCache,
    reference: ReferenceSet,
    value: &serde_json::Value,
    target_field: &str,
) -> Result<Vec<(String, serde_json::Value)>, String> {
    let raw = raw_text(value);
    match cache.lookup(reference, &raw) {
        Some(hit) => Ok(vec![(
            target_field.to_string(),
            serde_json::Value::String(hit.code.clone()),
        )]),
        None => Err(format!("no {reference} match")),
    }
}

/// `ai_match`: ask the extraction service for a suggestion, accepting only
/// matches above the confidence floor; anything else falls back to plain
/// lookup behavior.
pub fn apply_ai_match(
    service: &dyn ExtractionService,
    cache: &ReferenceCache,
    reference: ReferenceSet,
    value: &serde_json::Value,
    target_field: &str,
    confidence_floor: f32,
) -> Result<Vec<(String, serde_json::Value)>, String> {
    let raw = raw_text(value);
    match service.suggest_match(&raw, reference) {
        Ok(Some(suggestion)) if suggestion.confidence >= confidence_floor => {
            return Ok(vec![(
                target_field.to_string(),
                serde_json::Value::String(suggestion.code),
            )]);
        }
        Ok(Some(suggestion)) => {
            tracing::debug!(
                raw,
                code = suggestion.code,
                confidence = suggestion.confidence,
                floor = confidence_floor,
                "ai_match suggestion below floor, falling back to lookup"
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(raw, error = %e, "ai_match service call failed, falling back to lookup");
        }
    }
    apply_lookup(cache, reference, value, target_field)
}

/// `calculation`: derive a value from already-computed target fields.
pub fn apply_calculation(
    operation: &str,
    inputs: &[String],
    computed: &BTreeMap<String, serde_json::Value>,
    target_field: &str,
) -> Result<Vec<(String, serde_json::Value)>, String> {
    let mut values = Vec::with_capacity(inputs.len());
    for input in inputs {
        let value = computed
            .get(input)
            .ok_or_else(|| format!("input {input} not computed"))?;
        values.push(coerce_number(value).map_err(|e| format!("input {input}: {e}"))?);
    }

    let result = match operation {
        // BMI from weight in kg and height in cm
        "bmi" => {
            let [weight, height] = two(&values, operation)?;
            if height <= 0.0 {
                return Err("height must be positive".to_string());
            }
            let meters = height / 100.0;
            (weight / (meters * meters) * 10.0).round() / 10.0
        }
        "sum" => values.iter().sum(),
        "difference" => {
            let [a, b] = two(&values, operation)?;
            a - b
        }
        "product" => values.iter().product(),
        "ratio" => {
            let [a, b] = two(&values, operation)?;
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            a / b
        }
        other => return Err(format!("unknown operation: {other}")),
    };

    let number = serde_json::Number::from_f64(result)
        .ok_or_else(|| "calculation produced a non-finite number".to_string())?;
    Ok(vec![(
        target_field.to_string(),
        serde_json::Value::Number(number),
    )])
}

fn two(values: &[f64], operation: &str) -> Result<[f64; 2], String> {
    match values {
        [a, b] => Ok([*a, *b]),
        _ => Err(format!("{operation} requires exactly 2 inputs, got {}", values.len())),
    }
}
