use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::DecisionAction;
use crate::models::{ValidationDecision, WorkspaceId};

use super::documents::{format_ts, parse_ts, parse_uuid};

/// Append a validation decision. Decisions are never updated or deleted.
pub fn insert_decision(conn: &Connection, decision: &ValidationDecision) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO validation_decisions (id, extraction_id, workspace_id, action, decided_by,
         notes, supersedes, decided_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            decision.id.to_string(),
            decision.extraction_id.to_string(),
            decision.workspace_id.as_str(),
            decision.action.as_str(),
            decision.decided_by,
            decision.notes,
            decision.supersedes.map(|id| id.to_string()),
            format_ts(&decision.decided_at),
        ],
    )?;
    Ok(())
}

/// Most recent decision for an extraction, if any.
pub fn latest_decision(
    conn: &Connection,
    extraction_id: &Uuid,
) -> Result<Option<ValidationDecision>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, extraction_id, workspace_id, action, decided_by, notes, supersedes, decided_at
         FROM validation_decisions
         WHERE extraction_id = ?1
         ORDER BY decided_at DESC, rowid DESC
         LIMIT 1",
    )?;

    let result = stmt.query_row(params![extraction_id.to_string()], row_from_rusqlite);

    match result {
        Ok(row) => Ok(Some(decision_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Full decision history for an extraction, oldest first.
pub fn decision_history(
    conn: &Connection,
    extraction_id: &Uuid,
) -> Result<Vec<ValidationDecision>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, extraction_id, workspace_id, action, decided_by, notes, supersedes, decided_at
         FROM validation_decisions
         WHERE extraction_id = ?1
         ORDER BY decided_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![extraction_id.to_string()], row_from_rusqlite)?;

    let mut decisions = Vec::new();
    for row in rows {
        decisions.push(decision_from_row(row?)?);
    }
    Ok(decisions)
}

/// Count extractions by their latest decision action within a workspace.
/// Superseded decisions do not count toward the totals.
pub fn latest_decision_counts(
    conn: &Connection,
    workspace: &WorkspaceId,
) -> Result<(u32, u32), DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT vd.action, COUNT(*) FROM validation_decisions vd
         WHERE vd.workspace_id = ?1
           AND vd.rowid = (SELECT MAX(vd2.rowid) FROM validation_decisions vd2
                           WHERE vd2.extraction_id = vd.extraction_id)
         GROUP BY vd.action",
    )?;

    let rows = stmt.query_map(params![workspace.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
    })?;

    let mut approved = 0;
    let mut rejected = 0;
    for row in rows {
        let (action, count) = row?;
        match DecisionAction::from_str(&action)? {
            DecisionAction::Approved => approved = count,
            DecisionAction::Rejected => rejected = count,
        }
    }
    Ok((approved, rejected))
}

type DecisionRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<DecisionRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decision_from_row(row: DecisionRow) -> Result<ValidationDecision, DatabaseError> {
    let (id, extraction_id, workspace_id, action, decided_by, notes, supersedes, decided_at) = row;
    Ok(ValidationDecision {
        id: parse_uuid(&id)?,
        extraction_id: parse_uuid(&extraction_id)?,
        workspace_id: WorkspaceId(workspace_id),
        action: DecisionAction::from_str(&action)?,
        decided_by,
        notes,
        supersedes: supersedes.and_then(|s| Uuid::parse_str(&s).ok()),
        decided_at: parse_ts(&decided_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn seed_extraction(conn: &Connection, workspace: &str) -> Uuid {
        // Minimal parent rows to satisfy FK constraints
        let batch_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO batch_jobs (id, workspace_id, status, total_files, created_at)
             VALUES (?1, ?2, 'running', 1, datetime('now'))",
            params![batch_id.to_string(), workspace],
        )
        .unwrap();
        let doc_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO documents (id, workspace_id, batch_id, filename, content_path,
             content_hash, mime_type, size_bytes, document_type, status, uploaded_at)
             VALUES (?1, ?2, ?3, 'f.pdf', '/tmp/f.pdf', ?4, 'application/pdf', 1,
                     'other', 'extracted', datetime('now'))",
            params![doc_id.to_string(), workspace, batch_id.to_string(), Uuid::new_v4().to_string()],
        )
        .unwrap();
        let extraction_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO extraction_results (id, document_id, workspace_id, sections,
             section_confidence, created_at)
             VALUES (?1, ?2, ?3, '{}', '{}', datetime('now'))",
            params![extraction_id.to_string(), doc_id.to_string(), workspace],
        )
        .unwrap();
        extraction_id
    }

    fn make_decision(
        workspace: &str,
        extraction_id: Uuid,
        action: DecisionAction,
        supersedes: Option<Uuid>,
    ) -> ValidationDecision {
        ValidationDecision {
            id: Uuid::new_v4(),
            extraction_id,
            workspace_id: WorkspaceId::from(workspace),
            action,
            decided_by: "dr.naidoo".to_string(),
            notes: None,
            supersedes,
            decided_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn latest_decision_wins() {
        let conn = open_memory_database().unwrap();
        let extraction_id = seed_extraction(&conn, "ws-1");

        let first = make_decision("ws-1", extraction_id, DecisionAction::Rejected, None);
        insert_decision(&conn, &first).unwrap();
        let second = make_decision("ws-1", extraction_id, DecisionAction::Approved, Some(first.id));
        insert_decision(&conn, &second).unwrap();

        let latest = latest_decision(&conn, &extraction_id).unwrap().unwrap();
        assert_eq!(latest.action, DecisionAction::Approved);
        assert_eq!(latest.supersedes, Some(first.id));

        let history = decision_history(&conn, &extraction_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, DecisionAction::Rejected);
    }

    #[test]
    fn counts_use_latest_decision_only() {
        let conn = open_memory_database().unwrap();
        let a = seed_extraction(&conn, "ws-1");
        let b = seed_extraction(&conn, "ws-1");

        // a: rejected then re-approved — counts as approved only
        let first = make_decision("ws-1", a, DecisionAction::Rejected, None);
        insert_decision(&conn, &first).unwrap();
        insert_decision(&conn, &make_decision("ws-1", a, DecisionAction::Approved, Some(first.id)))
            .unwrap();
        // b: rejected
        insert_decision(&conn, &make_decision("ws-1", b, DecisionAction::Rejected, None)).unwrap();

        let (approved, rejected) = latest_decision_counts(&conn, &WorkspaceId::from("ws-1")).unwrap();
        assert_eq!(approved, 1);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn no_decisions_returns_none() {
        let conn = open_memory_database().unwrap();
        let extraction_id = seed_extraction(&conn, "ws-1");
        assert!(latest_decision(&conn, &extraction_id).unwrap().is_none());
        let (approved, rejected) = latest_decision_counts(&conn, &WorkspaceId::from("ws-1")).unwrap();
        assert_eq!((approved, rejected), (0, 0));
    }
}
