use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::ReferenceSet;

/// A reference code with its human-readable description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceCode {
    pub code: String,
    pub description: String,
}

fn table_for(set: ReferenceSet) -> &'static str {
    match set {
        ReferenceSet::Icd10 => "icd10_codes",
        ReferenceSet::Nappi => "nappi_codes",
    }
}

/// Insert-or-replace a reference code (seeding and operator imports).
pub fn upsert_reference_code(
    conn: &Connection,
    set: ReferenceSet,
    code: &str,
    description: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO {} (code, description) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET description = excluded.description",
            table_for(set)
        ),
        params![code, description],
    )?;
    Ok(())
}

/// Load an entire reference set, for the shared in-memory cache.
pub fn load_reference_codes(
    conn: &Connection,
    set: ReferenceSet,
) -> Result<Vec<ReferenceCode>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT code, description FROM {} ORDER BY code ASC",
        table_for(set)
    ))?;

    let rows = stmt.query_map([], |row| {
        Ok(ReferenceCode {
            code: row.get(0)?,
            description: row.get(1)?,
        })
    })?;

    let mut codes = Vec::new();
    for row in rows {
        codes.push(row?);
    }
    Ok(codes)
}
