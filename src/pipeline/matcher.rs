//! Patient matcher — resolves parsed demographics to an existing patient.
//!
//! Matching precedence: exact id_number (highest confidence) → exact
//! (first_name, last_name, dob) triple → fuzzy name + dob. A fuzzy match is
//! always flagged as such, never silently treated as exact. No match means
//! the caller creates a new patient from the demographics.

use rusqlite::Connection;

use crate::db::repository::{
    find_patient_by_id_number, find_patient_by_name_dob, list_patients,
};
use crate::db::DatabaseError;
use crate::models::enums::MatchType;
use crate::models::{ParsedDemographics, PatientMatchResult, WorkspaceId};

/// Minimum jaro-winkler similarity of normalized full names for a fuzzy
/// match. Below this, dissimilar names must not resolve to a patient.
pub const DEFAULT_FUZZY_FLOOR: f64 = 0.88;

pub fn match_patient(
    conn: &Connection,
    workspace: &WorkspaceId,
    demographics: &ParsedDemographics,
    fuzzy_floor: f64,
) -> Result<PatientMatchResult, DatabaseError> {
    // 1. Exact id_number
    if let Some(id_number) = demographics.id_number.as_deref().filter(|s| !s.trim().is_empty()) {
        if let Some(patient) = find_patient_by_id_number(conn, workspace, id_number.trim())? {
            return Ok(PatientMatchResult {
                match_found: true,
                match_type: MatchType::IdNumber,
                confidence: 1.0,
                patient_id: Some(patient.id),
            });
        }
    }

    let (first, last, dob) = match (
        demographics.first_name.as_deref(),
        demographics.last_name.as_deref(),
        demographics.date_of_birth,
    ) {
        (Some(first), Some(last), Some(dob)) => (first, last, dob),
        // Without a full name + dob there is nothing further to match on.
        _ => return Ok(PatientMatchResult::none()),
    };

    // 2. Exact (first_name, last_name, dob) triple
    if let Some(patient) = find_patient_by_name_dob(conn, workspace, first, last, &dob)? {
        return Ok(PatientMatchResult {
            match_found: true,
            match_type: MatchType::NameDob,
            confidence: 0.95,
            patient_id: Some(patient.id),
        });
    }

    // 3. Fuzzy name + exact dob, lowest confidence
    let needle = normalize_name(&format!("{first} {last}"));
    let mut best: Option<(f64, uuid::Uuid)> = None;
    for patient in list_patients(conn, workspace)? {
        if patient.date_of_birth != Some(dob) {
            continue;
        }
        let candidate = normalize_name(&format!("{} {}", patient.first_name, patient.last_name));
        let similarity = strsim::jaro_winkler(&needle, &candidate);
        if similarity >= fuzzy_floor && best.map_or(true, |(s, _)| similarity > s) {
            best = Some((similarity, patient.id));
        }
    }

    if let Some((similarity, patient_id)) = best {
        return Ok(PatientMatchResult {
            match_found: true,
            match_type: MatchType::Fuzzy,
            confidence: similarity as f32,
            patient_id: Some(patient_id),
        });
    }

    Ok(PatientMatchResult::none())
}

/// Pull demographics out of canonical extraction sections.
///
/// Looks for a `patient` (or `demographics`) section. Returns None when no
/// such section exists or it carries nothing usable.
pub fn parse_demographics(sections: &serde_json::Value) -> Option<ParsedDemographics> {
    let section = sections
        .get("patient")
        .or_else(|| sections.get("demographics"))?;
    let record = match section {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };

    let text = |field: &str| -> Option<String> {
        record
            .get(field)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let demographics = ParsedDemographics {
        id_number: text("id_number"),
        first_name: text("first_name"),
        last_name: text("last_name"),
        date_of_birth: text("date_of_birth").and_then(|s| parse_dob(&s)),
        sex: text("sex"),
        contact_number: text("contact_number"),
    };

    let usable = demographics.id_number.is_some()
        || (demographics.first_name.is_some() && demographics.last_name.is_some());
    usable.then_some(demographics)
}

fn parse_dob(s: &str) -> Option<chrono::NaiveDate> {
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d %b %Y", "%d %B %Y"] {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    None
}

/// Lowercase, alphabetic-only, single-spaced name form for comparison.
fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for c in name.chars() {
        if c.is_alphabetic() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}
