use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::MatchType;
use super::WorkspaceId;

/// Sentinel for required patient fields missing from parsed demographics.
/// New-patient creation never fails on a missing field; it records this
/// instead.
pub const UNKNOWN_SENTINEL: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub id_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub contact_number: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Demographics parsed out of an extracted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDemographics {
    pub id_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<String>,
    pub contact_number: Option<String>,
}

/// Outcome of the matching step. Ephemeral — not persisted beyond it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientMatchResult {
    pub match_found: bool,
    pub match_type: MatchType,
    pub confidence: f32,
    pub patient_id: Option<Uuid>,
}

impl PatientMatchResult {
    pub fn none() -> Self {
        Self {
            match_found: false,
            match_type: MatchType::None,
            confidence: 0.0,
            patient_id: None,
        }
    }
}
