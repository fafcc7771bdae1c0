use chrono::NaiveDate;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{ParsedDemographics, Patient, WorkspaceId, UNKNOWN_SENTINEL};

use super::documents::{format_ts, parse_ts, parse_uuid};

const PATIENT_COLUMNS: &str =
    "id, workspace_id, id_number, first_name, last_name, date_of_birth, sex, contact_number, created_at";

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, workspace_id, id_number, first_name, last_name,
         date_of_birth, sex, contact_number, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            patient.id.to_string(),
            patient.workspace_id.as_str(),
            patient.id_number,
            patient.first_name,
            patient.last_name,
            patient.date_of_birth.map(|d| d.to_string()),
            patient.sex,
            patient.contact_number,
            format_ts(&patient.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    query_one(
        conn,
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
        params![id.to_string()],
    )
}

pub fn find_patient_by_id_number(
    conn: &Connection,
    workspace: &WorkspaceId,
    id_number: &str,
) -> Result<Option<Patient>, DatabaseError> {
    query_one(
        conn,
        &format!(
            "SELECT {PATIENT_COLUMNS} FROM patients
             WHERE workspace_id = ?1 AND id_number = ?2 LIMIT 1"
        ),
        params![workspace.as_str(), id_number],
    )
}

/// Exact (first_name, last_name, dob) triple, case-insensitive on names.
pub fn find_patient_by_name_dob(
    conn: &Connection,
    workspace: &WorkspaceId,
    first_name: &str,
    last_name: &str,
    dob: &NaiveDate,
) -> Result<Option<Patient>, DatabaseError> {
    query_one(
        conn,
        &format!(
            "SELECT {PATIENT_COLUMNS} FROM patients
             WHERE workspace_id = ?1
               AND LOWER(first_name) = LOWER(?2)
               AND LOWER(last_name) = LOWER(?3)
               AND date_of_birth = ?4
             LIMIT 1"
        ),
        params![workspace.as_str(), first_name, last_name, dob.to_string()],
    )
}

/// All patients in a workspace, for the fuzzy matching pass.
pub fn list_patients(
    conn: &Connection,
    workspace: &WorkspaceId,
) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE workspace_id = ?1"
    ))?;

    let rows = stmt.query_map(params![workspace.as_str()], row_from_rusqlite)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(patient_from_row(row?)?);
    }
    Ok(patients)
}

/// Create a patient from parsed demographics, defaulting missing required
/// fields to the explicit "Unknown" sentinel rather than failing creation.
pub fn create_patient_from_demographics(
    conn: &Connection,
    workspace: &WorkspaceId,
    demographics: &ParsedDemographics,
) -> Result<Patient, DatabaseError> {
    let patient = Patient {
        id: Uuid::new_v4(),
        workspace_id: workspace.clone(),
        id_number: demographics.id_number.clone(),
        first_name: demographics
            .first_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_SENTINEL.to_string()),
        last_name: demographics
            .last_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_SENTINEL.to_string()),
        date_of_birth: demographics.date_of_birth,
        sex: demographics.sex.clone(),
        contact_number: demographics.contact_number.clone(),
        created_at: chrono::Utc::now().naive_utc(),
    };
    insert_patient(conn, &patient)?;
    Ok(patient)
}

fn query_one(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let result = stmt.query_row(params, row_from_rusqlite);
    match result {
        Ok(row) => Ok(Some(patient_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

type PatientRow = (
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PatientRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    let (id, workspace_id, id_number, first_name, last_name, dob, sex, contact_number, created_at) =
        row;
    Ok(Patient {
        id: parse_uuid(&id)?,
        workspace_id: WorkspaceId(workspace_id),
        id_number,
        first_name,
        last_name,
        date_of_birth: dob.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        sex,
        contact_number,
        created_at: parse_ts(&created_at),
    })
}
