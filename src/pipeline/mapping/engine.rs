//! Candidate computation: applies a template's field mappings, in
//! ascending processing order, to canonical extraction sections.
//!
//! Computation never writes to the database; durable writes happen only in
//! [`super::commit`] after human approval.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::enums::TransformationType;
use crate::models::{CandidateRecord, ExtractionTemplate, FieldMapping, PopulationError};
use crate::pipeline::extract::ExtractionService;

use super::lookup::ReferenceCache;
use super::transform;

pub struct MappingEngine<'a> {
    service: &'a dyn ExtractionService,
    refs: &'a ReferenceCache,
    /// Default confidence floor for `ai_match`; individual mappings may
    /// override via config.
    ai_match_floor: f32,
}

/// Output of `compute`: candidate rows plus everything that went wrong.
#[derive(Debug, Default)]
pub struct ComputeOutcome {
    pub candidates: Vec<CandidateRecord>,
    pub errors: Vec<PopulationError>,
    pub fields_extracted: u32,
}

impl<'a> MappingEngine<'a> {
    pub fn new(
        service: &'a dyn ExtractionService,
        refs: &'a ReferenceCache,
        ai_match_floor: f32,
    ) -> Self {
        Self {
            service,
            refs,
            ai_match_floor,
        }
    }

    /// Apply every mapping of `template` to `sections`.
    ///
    /// Failures are recoverable per field: an optional mapping's failure
    /// skips the field; a required mapping's failure aborts population for
    /// its target table only. Either way the document proceeds.
    pub fn compute(
        &self,
        sections: &serde_json::Value,
        template: &ExtractionTemplate,
    ) -> ComputeOutcome {
        let mut mappings: Vec<&FieldMapping> = template.mappings.iter().collect();
        mappings.sort_by_key(|m| m.processing_order);

        let mut records: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
        // Cross-table registry of computed fields, keyed "table.field",
        // feeding later calculation mappings.
        let mut computed: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        let mut aborted: BTreeSet<String> = BTreeSet::new();
        let mut outcome = ComputeOutcome::default();

        for mapping in mappings {
            if aborted.contains(&mapping.target_table) {
                continue;
            }

            match self.apply(mapping, sections, &computed) {
                Ok(fields) => {
                    outcome.fields_extracted += fields.len() as u32;
                    let record = records.entry(mapping.target_table.clone()).or_default();
                    for (field, value) in fields {
                        computed.insert(
                            format!("{}.{}", mapping.target_table, field),
                            value.clone(),
                        );
                        record.insert(field, value);
                    }
                }
                Err((message, raw_value)) => {
                    let error = PopulationError::new(
                        (&mapping.source_section, &mapping.source_field),
                        (&mapping.target_table, &mapping.target_field),
                        &message,
                        raw_value,
                    );
                    if mapping.is_required {
                        tracing::warn!(
                            target_table = mapping.target_table,
                            target_field = mapping.target_field,
                            message,
                            "Required mapping failed, aborting table population"
                        );
                        aborted.insert(mapping.target_table.clone());
                        records.remove(&mapping.target_table);
                    } else {
                        tracing::debug!(
                            target_table = mapping.target_table,
                            target_field = mapping.target_field,
                            message,
                            "Optional mapping failed, field skipped"
                        );
                    }
                    outcome.errors.push(error);
                }
            }
        }

        outcome.candidates = records
            .into_iter()
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(target_table, fields)| CandidateRecord {
                target_table,
                fields,
            })
            .collect();
        outcome
    }

    fn apply(
        &self,
        mapping: &FieldMapping,
        sections: &serde_json::Value,
        computed: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<(String, serde_json::Value)>, (String, Option<String>)> {
        match mapping.transformation_type {
            TransformationType::Calculation => {
                let operation = mapping
                    .config
                    .operation
                    .as_deref()
                    .ok_or(("calculation has no operation".to_string(), None))?;
                transform::apply_calculation(
                    operation,
                    &mapping.config.inputs,
                    computed,
                    &mapping.target_field,
                )
                .map_err(|e| (e, None))
            }
            TransformationType::Concatenation => transform::apply_concatenation(
                sections,
                &mapping.source_section,
                &mapping.config.source_fields,
                mapping.config.separator.as_deref().unwrap_or(" "),
                &mapping.target_field,
            )
            .map_err(|e| (e, None)),
            _ => {
                let value = transform::source_value(
                    sections,
                    &mapping.source_section,
                    &mapping.source_field,
                )
                .ok_or(("source value missing".to_string(), None))?;
                let raw = Some(transform::raw_text(value));

                let result = match mapping.transformation_type {
                    TransformationType::Direct => transform::apply_direct(
                        value,
                        mapping.field_type,
                        &mapping.target_field,
                    ),
                    TransformationType::Split => transform::apply_split(
                        value,
                        mapping.config.delimiter.as_deref().unwrap_or("/"),
                        &mapping.config.target_fields,
                        mapping.field_type,
                    ),
                    TransformationType::Lookup => {
                        let reference = mapping
                            .config
                            .reference
                            .ok_or_else(|| "lookup has no reference set".to_string());
                        reference.and_then(|set| {
                            transform::apply_lookup(self.refs, set, value, &mapping.target_field)
                        })
                    }
                    TransformationType::AiMatch => {
                        let reference = mapping
                            .config
                            .reference
                            .ok_or_else(|| "ai_match has no reference set".to_string());
                        reference.and_then(|set| {
                            transform::apply_ai_match(
                                self.service,
                                self.refs,
                                set,
                                value,
                                &mapping.target_field,
                                mapping.config.confidence_floor.unwrap_or(self.ai_match_floor),
                            )
                        })
                    }
                    _ => unreachable!("handled above"),
                };
                result.map_err(|e| (e, raw))
            }
        }
    }
}
