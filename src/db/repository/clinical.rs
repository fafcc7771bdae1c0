use std::collections::BTreeMap;

use rusqlite::{Connection, ToSql};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::whitelist::find_table;
use crate::models::WorkspaceId;

/// Insert one auto-populated row into a whitelisted clinical table.
///
/// Columns come from the fixed whitelist (validated at template save time),
/// so the generated SQL only ever names known tables and fields. Fields
/// absent from the candidate stay NULL.
pub fn insert_clinical_row(
    conn: &Connection,
    table: &str,
    workspace: &WorkspaceId,
    patient_id: Option<&Uuid>,
    extraction_id: &Uuid,
    fields: &BTreeMap<String, serde_json::Value>,
) -> Result<Uuid, DatabaseError> {
    let table = find_table(table).ok_or_else(|| {
        DatabaseError::ConstraintViolation(format!("unknown clinical table: {table}"))
    })?;

    let row_id = Uuid::new_v4();
    let mut columns: Vec<&str> = vec!["id", "workspace_id", "patient_id", "source_extraction_id", "created_at"];
    let row_id_s = row_id.to_string();
    let patient_s = patient_id.map(|id| id.to_string());
    let extraction_s = extraction_id.to_string();
    let now = chrono::Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string();

    let mut values: Vec<Box<dyn ToSql>> = vec![
        Box::new(row_id_s),
        Box::new(workspace.as_str().to_string()),
        Box::new(patient_s),
        Box::new(extraction_s),
        Box::new(now),
    ];

    for &column in table.columns {
        if let Some(value) = fields.get(column) {
            columns.push(column);
            values.push(json_to_sql(value));
        }
    }

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders.join(", ")
    );

    let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&sql, params.as_slice())?;
    Ok(row_id)
}

/// Count rows in a whitelisted clinical table (test and stats support).
pub fn count_clinical_rows(conn: &Connection, table: &str) -> Result<u32, DatabaseError> {
    let table = find_table(table).ok_or_else(|| {
        DatabaseError::ConstraintViolation(format!("unknown clinical table: {table}"))
    })?;
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

/// Rows in a clinical table attributed to a given extraction.
pub fn count_rows_for_extraction(
    conn: &Connection,
    table: &str,
    extraction_id: &Uuid,
) -> Result<u32, DatabaseError> {
    let table = find_table(table).ok_or_else(|| {
        DatabaseError::ConstraintViolation(format!("unknown clinical table: {table}"))
    })?;
    let count = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE source_extraction_id = ?1",
            table.name
        ),
        [extraction_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn json_to_sql(value: &serde_json::Value) -> Box<dyn ToSql> {
    match value {
        serde_json::Value::Null => Box::new(None::<String>),
        serde_json::Value::Bool(b) => Box::new(*b as i32),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else {
                Box::new(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}
