//! Shared reference-code cache (ICD-10, NAPPI).
//!
//! Loaded once at startup and shared read-only across concurrent workers;
//! reference tables never change during pipeline execution.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::db::repository::{load_reference_codes, ReferenceCode};
use crate::db::DatabaseError;
use crate::models::enums::ReferenceSet;

#[derive(Debug, Default)]
struct ReferenceIndex {
    by_code: HashMap<String, ReferenceCode>,
    by_description: HashMap<String, ReferenceCode>,
}

impl ReferenceIndex {
    fn build(codes: Vec<ReferenceCode>) -> Self {
        let mut by_code = HashMap::with_capacity(codes.len());
        let mut by_description = HashMap::with_capacity(codes.len());
        for code in codes {
            by_code.insert(code.code.to_uppercase(), code.clone());
            by_description.insert(normalize_text(&code.description), code);
        }
        Self {
            by_code,
            by_description,
        }
    }

    fn lookup(&self, raw: &str) -> Option<&ReferenceCode> {
        self.by_code
            .get(raw.trim().to_uppercase().as_str())
            .or_else(|| self.by_description.get(normalize_text(raw).as_str()))
    }
}

#[derive(Debug, Default)]
pub struct ReferenceCache {
    icd10: ReferenceIndex,
    nappi: ReferenceIndex,
}

impl ReferenceCache {
    pub fn load(conn: &Connection) -> Result<Self, DatabaseError> {
        Ok(Self {
            icd10: ReferenceIndex::build(load_reference_codes(conn, ReferenceSet::Icd10)?),
            nappi: ReferenceIndex::build(load_reference_codes(conn, ReferenceSet::Nappi)?),
        })
    }

    /// Match raw text against a reference set by exact code or
    /// normalized-text description.
    pub fn lookup(&self, set: ReferenceSet, raw: &str) -> Option<&ReferenceCode> {
        match set {
            ReferenceSet::Icd10 => self.icd10.lookup(raw),
            ReferenceSet::Nappi => self.nappi.lookup(raw),
        }
    }
}

/// Lowercase alphanumeric words, single-spaced.
fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}
