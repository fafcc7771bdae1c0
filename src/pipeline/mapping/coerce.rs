//! Field-type coercion for mapped values.
//!
//! A coercion failure is recoverable: the caller records a population error
//! and skips the field.

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::enums::FieldType;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d %b %Y", "%d %B %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Coerce a raw extracted value to the mapping's declared field type.
/// Returns the normalized JSON value to store, or a message describing why
/// the value could not be coerced.
pub fn coerce(value: &serde_json::Value, field_type: FieldType) -> Result<serde_json::Value, String> {
    match field_type {
        FieldType::Text => coerce_text(value),
        FieldType::Number => coerce_number(value).map(|n| {
            serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null)
        }),
        FieldType::Date => coerce_date(value).map(|d| serde_json::Value::String(d.to_string())),
        FieldType::Datetime => coerce_datetime(value)
            .map(|dt| serde_json::Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())),
        FieldType::Boolean => coerce_boolean(value).map(serde_json::Value::Bool),
        FieldType::Json => Ok(value.clone()),
    }
}

fn coerce_text(value: &serde_json::Value) -> Result<serde_json::Value, String> {
    match value {
        serde_json::Value::String(s) => Ok(serde_json::Value::String(s.trim().to_string())),
        serde_json::Value::Number(n) => Ok(serde_json::Value::String(n.to_string())),
        serde_json::Value::Bool(b) => Ok(serde_json::Value::String(b.to_string())),
        serde_json::Value::Null => Err("value is null".to_string()),
        other => Err(format!("cannot render {other} as text")),
    }
}

/// Accept plain numbers and numeric-prefixed strings ("6.1 mmol/L", "120").
pub fn coerce_number(value: &serde_json::Value) -> Result<f64, String> {
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| "number out of range".to_string()),
        serde_json::Value::String(s) => parse_leading_number(s)
            .ok_or_else(|| format!("not numeric: {s:?}")),
        other => Err(format!("cannot coerce {other} to number")),
    }
}

/// Pull the leading numeric token out of a string, tolerating units and
/// thousands separators.
fn parse_leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim().replace(',', "");
    let end = trimmed
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    trimmed[..end].parse::<f64>().ok()
}

fn coerce_date(value: &serde_json::Value) -> Result<NaiveDate, String> {
    let s = value
        .as_str()
        .ok_or_else(|| format!("cannot coerce {value} to date"))?
        .trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }
    Err(format!("unrecognized date: {s:?}"))
}

fn coerce_datetime(value: &serde_json::Value) -> Result<NaiveDateTime, String> {
    let s = value
        .as_str()
        .ok_or_else(|| format!("cannot coerce {value} to datetime"))?
        .trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    // Date-only input lands at midnight
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }
    Err(format!("unrecognized datetime: {s:?}"))
}

fn coerce_boolean(value: &serde_json::Value) -> Result<bool, String> {
    match value {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("not boolean: {n}")),
        },
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(true),
            "false" | "no" | "n" | "0" => Ok(false),
            other => Err(format!("not boolean: {other:?}")),
        },
        other => Err(format!("cannot coerce {other} to boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_from_string_with_unit() {
        assert_eq!(
            coerce(&serde_json::json!("6.1 mmol/L"), FieldType::Number).unwrap(),
            serde_json::json!(6.1)
        );
        assert_eq!(
            coerce(&serde_json::json!("120"), FieldType::Number).unwrap(),
            serde_json::json!(120.0)
        );
        assert_eq!(
            coerce(&serde_json::json!("1,250 IU"), FieldType::Number).unwrap(),
            serde_json::json!(1250.0)
        );
    }

    #[test]
    fn number_failure_is_descriptive() {
        let err = coerce(&serde_json::json!("normal"), FieldType::Number).unwrap_err();
        assert!(err.contains("normal"));
    }

    #[test]
    fn date_formats_accepted() {
        for raw in ["2026-07-01", "01/07/2026", "1 Jul 2026", "1 July 2026"] {
            let coerced = coerce(&serde_json::json!(raw), FieldType::Date).unwrap();
            assert_eq!(coerced, serde_json::json!("2026-07-01"), "failed for {raw}");
        }
    }

    #[test]
    fn datetime_accepts_date_only() {
        let coerced = coerce(&serde_json::json!("2026-07-01"), FieldType::Datetime).unwrap();
        assert_eq!(coerced, serde_json::json!("2026-07-01 00:00:00"));
    }

    #[test]
    fn boolean_variants() {
        for raw in ["yes", "TRUE", "1", "y"] {
            assert_eq!(
                coerce(&serde_json::json!(raw), FieldType::Boolean).unwrap(),
                serde_json::json!(true),
                "failed for {raw}"
            );
        }
        assert_eq!(
            coerce(&serde_json::json!("No"), FieldType::Boolean).unwrap(),
            serde_json::json!(false)
        );
    }

    #[test]
    fn text_trims_and_stringifies() {
        assert_eq!(
            coerce(&serde_json::json!("  MMR  "), FieldType::Text).unwrap(),
            serde_json::json!("MMR")
        );
        assert_eq!(
            coerce(&serde_json::json!(2), FieldType::Text).unwrap(),
            serde_json::json!("2")
        );
    }

    #[test]
    fn null_fails_text() {
        assert!(coerce(&serde_json::Value::Null, FieldType::Text).is_err());
    }

    #[test]
    fn json_passes_through() {
        let value = serde_json::json!({"nested": [1, 2]});
        assert_eq!(coerce(&value, FieldType::Json).unwrap(), value);
    }
}
