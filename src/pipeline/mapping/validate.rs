//! Template validation at save time.
//!
//! Configuration errors (unknown tables/fields, calculation dependency
//! violations, incomplete transformation config) are rejected here so they
//! can never surface at mapping-application time.

use std::collections::BTreeSet;

use crate::models::enums::TransformationType;
use crate::models::whitelist::{find_table, is_known_field};
use crate::models::{ExtractionTemplate, FieldMapping};

use super::MappingError;

const CALCULATION_OPERATIONS: &[&str] = &["bmi", "sum", "difference", "product", "ratio"];

/// All violations in a template, empty if it is valid.
pub fn validate_template(template: &ExtractionTemplate) -> Vec<String> {
    let mut violations = Vec::new();
    let mut mappings: Vec<&FieldMapping> = template.mappings.iter().collect();
    mappings.sort_by_key(|m| m.processing_order);

    // Fields produced by mappings at a strictly lower processing_order.
    let mut produced: BTreeSet<String> = BTreeSet::new();

    for mapping in mappings {
        let at = format!(
            "mapping {} -> {}.{}",
            mapping.source_field, mapping.target_table, mapping.target_field
        );

        if find_table(&mapping.target_table).is_none() {
            violations.push(format!("{at}: unknown target table {}", mapping.target_table));
            continue;
        }

        match mapping.transformation_type {
            TransformationType::Split => {
                if mapping.config.delimiter.as_deref().unwrap_or("").is_empty() {
                    violations.push(format!("{at}: split requires a delimiter"));
                }
                if mapping.config.target_fields.is_empty() {
                    violations.push(format!("{at}: split requires target_fields"));
                }
                for field in &mapping.config.target_fields {
                    if !is_known_field(&mapping.target_table, field) {
                        violations.push(format!(
                            "{at}: unknown target field {}.{field}",
                            mapping.target_table
                        ));
                    }
                }
            }
            TransformationType::Concatenation => {
                if mapping.config.source_fields.is_empty() {
                    violations.push(format!("{at}: concatenation requires source_fields"));
                }
                check_target_field(mapping, &at, &mut violations);
            }
            TransformationType::Lookup | TransformationType::AiMatch => {
                if mapping.config.reference.is_none() {
                    violations.push(format!(
                        "{at}: {} requires a reference set",
                        mapping.transformation_type
                    ));
                }
                check_target_field(mapping, &at, &mut violations);
            }
            TransformationType::Calculation => {
                match mapping.config.operation.as_deref() {
                    Some(op) if CALCULATION_OPERATIONS.contains(&op) => {}
                    Some(op) => {
                        violations.push(format!("{at}: unknown calculation operation {op}"))
                    }
                    None => violations.push(format!("{at}: calculation requires an operation")),
                }
                if mapping.config.inputs.is_empty() {
                    violations.push(format!("{at}: calculation requires inputs"));
                }
                for input in &mapping.config.inputs {
                    match input.split_once('.') {
                        Some((table, field)) if is_known_field(table, field) => {
                            // Dependency ordering: inputs must be produced
                            // by a strictly earlier mapping.
                            if !produced.contains(input) {
                                violations.push(format!(
                                    "{at}: input {input} is not produced by an earlier mapping"
                                ));
                            }
                        }
                        _ => violations.push(format!("{at}: invalid input reference {input}")),
                    }
                }
                check_target_field(mapping, &at, &mut violations);
            }
            TransformationType::Direct => {
                check_target_field(mapping, &at, &mut violations);
            }
        }

        for field in produced_fields(mapping) {
            produced.insert(format!("{}.{}", mapping.target_table, field));
        }
    }

    violations
}

/// Validate and convert violations into an error, for save paths.
pub fn validate_template_or_error(template: &ExtractionTemplate) -> Result<(), MappingError> {
    let violations = validate_template(template);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(MappingError::InvalidTemplate(violations.join("; ")))
    }
}

fn check_target_field(mapping: &FieldMapping, at: &str, violations: &mut Vec<String>) {
    if !is_known_field(&mapping.target_table, &mapping.target_field) {
        violations.push(format!(
            "{at}: unknown target field {}.{}",
            mapping.target_table, mapping.target_field
        ));
    }
}

/// The target fields a mapping writes when it succeeds.
fn produced_fields(mapping: &FieldMapping) -> Vec<&str> {
    match mapping.transformation_type {
        TransformationType::Split => mapping
            .config
            .target_fields
            .iter()
            .map(String::as_str)
            .collect(),
        _ => vec![mapping.target_field.as_str()],
    }
}
