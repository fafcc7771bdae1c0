use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{DocumentType, FieldType, TransformationType};
use crate::models::{ExtractionTemplate, FieldMapping, MappingConfig, WorkspaceId};

use super::documents::{format_ts, parse_ts, parse_uuid};

/// Insert a template with its mappings in one transaction.
pub fn insert_template(
    conn: &mut Connection,
    template: &ExtractionTemplate,
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO extraction_templates (id, workspace_id, name, document_type,
         auto_populate, require_validation, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            template.id.to_string(),
            template.workspace_id.as_str(),
            template.name,
            template.document_type.as_str(),
            template.auto_populate as i32,
            template.require_validation as i32,
            template.active as i32,
            format_ts(&template.created_at),
        ],
    )?;
    for mapping in &template.mappings {
        insert_mapping_stmt(&tx, mapping)?;
    }
    tx.commit()?;
    Ok(())
}

fn insert_mapping_stmt(
    conn: &Connection,
    mapping: &FieldMapping,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO field_mappings (id, template_id, source_section, source_field,
         target_table, target_field, transformation_type, field_type, is_required,
         processing_order, config)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            mapping.id.to_string(),
            mapping.template_id.to_string(),
            mapping.source_section,
            mapping.source_field,
            mapping.target_table,
            mapping.target_field,
            mapping.transformation_type.as_str(),
            mapping.field_type.as_str(),
            mapping.is_required as i32,
            mapping.processing_order,
            serde_json::to_string(&mapping.config)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        ],
    )?;
    Ok(())
}

/// Load a template with mappings sorted ascending by processing_order.
pub fn get_template(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<ExtractionTemplate>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, workspace_id, name, document_type, auto_populate, require_validation,
         active, created_at
         FROM extraction_templates WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], template_row);

    match result {
        Ok(row) => {
            let mut template = template_from_row(row)?;
            template.mappings = mappings_for_template(conn, &template.id)?;
            Ok(Some(template))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_templates(
    conn: &Connection,
    workspace: &WorkspaceId,
) -> Result<Vec<ExtractionTemplate>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, workspace_id, name, document_type, auto_populate, require_validation,
         active, created_at
         FROM extraction_templates WHERE workspace_id = ?1 ORDER BY name ASC",
    )?;

    let rows = stmt.query_map(params![workspace.as_str()], template_row)?;

    let mut templates = Vec::new();
    for row in rows {
        let mut template = template_from_row(row?)?;
        template.mappings = mappings_for_template(conn, &template.id)?;
        templates.push(template);
    }
    Ok(templates)
}

/// The active template for a document type, if one is configured.
pub fn find_active_template(
    conn: &Connection,
    workspace: &WorkspaceId,
    document_type: DocumentType,
) -> Result<Option<ExtractionTemplate>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, workspace_id, name, document_type, auto_populate, require_validation,
         active, created_at
         FROM extraction_templates
         WHERE workspace_id = ?1 AND document_type = ?2 AND active = 1
         ORDER BY created_at DESC LIMIT 1",
    )?;

    let result = stmt.query_row(
        params![workspace.as_str(), document_type.as_str()],
        template_row,
    );

    match result {
        Ok(row) => {
            let mut template = template_from_row(row)?;
            template.mappings = mappings_for_template(conn, &template.id)?;
            Ok(Some(template))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace a template's definition (header fields and full mapping set).
pub fn update_template(
    conn: &mut Connection,
    template: &ExtractionTemplate,
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE extraction_templates
         SET name = ?2, document_type = ?3, auto_populate = ?4, require_validation = ?5, active = ?6
         WHERE id = ?1",
        params![
            template.id.to_string(),
            template.name,
            template.document_type.as_str(),
            template.auto_populate as i32,
            template.require_validation as i32,
            template.active as i32,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ExtractionTemplate".into(),
            id: template.id.to_string(),
        });
    }
    tx.execute(
        "DELETE FROM field_mappings WHERE template_id = ?1",
        params![template.id.to_string()],
    )?;
    for mapping in &template.mappings {
        insert_mapping_stmt(&tx, mapping)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_template(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM extraction_templates WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ExtractionTemplate".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn mappings_for_template(
    conn: &Connection,
    template_id: &Uuid,
) -> Result<Vec<FieldMapping>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, template_id, source_section, source_field, target_table, target_field,
         transformation_type, field_type, is_required, processing_order, config
         FROM field_mappings WHERE template_id = ?1 ORDER BY processing_order ASC",
    )?;

    let rows = stmt.query_map(params![template_id.to_string()], mapping_row)?;

    let mut mappings = Vec::new();
    for row in rows {
        mappings.push(mapping_from_row(row?)?);
    }
    Ok(mappings)
}

type TemplateRow = (String, String, String, String, i32, i32, i32, String);

fn template_row(row: &rusqlite::Row<'_>) -> Result<TemplateRow, rusqlite::Error> {
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

fn template_from_row(row: TemplateRow) -> Result<ExtractionTemplate, DatabaseError> {
    let (id, workspace_id, name, document_type, auto_populate, require_validation, active, created_at) =
        row;
    Ok(ExtractionTemplate {
        id: parse_uuid(&id)?,
        workspace_id: WorkspaceId(workspace_id),
        name,
        document_type: DocumentType::from_str(&document_type)?,
        auto_populate: auto_populate != 0,
        require_validation: require_validation != 0,
        active: active != 0,
        created_at: parse_ts(&created_at),
        mappings: Vec::new(),
    })
}

type MappingRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i32,
    i32,
    String,
);

fn mapping_row(row: &rusqlite::Row<'_>) -> Result<MappingRow, rusqlite::Error> {
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
        row.get(9)?,
        row.get(10)?,
    ))
}

fn mapping_from_row(row: MappingRow) -> Result<FieldMapping, DatabaseError> {
    let (
        id,
        template_id,
        source_section,
        source_field,
        target_table,
        target_field,
        transformation_type,
        field_type,
        is_required,
        processing_order,
        config,
    ) = row;
    Ok(FieldMapping {
        id: parse_uuid(&id)?,
        template_id: parse_uuid(&template_id)?,
        source_section,
        source_field,
        target_table,
        target_field,
        transformation_type: TransformationType::from_str(&transformation_type)?,
        field_type: FieldType::from_str(&field_type)?,
        is_required: is_required != 0,
        processing_order,
        config: serde_json::from_str::<MappingConfig>(&config).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn make_template(workspace: &str) -> ExtractionTemplate {
        let template_id = Uuid::new_v4();
        ExtractionTemplate {
            id: template_id,
            workspace_id: WorkspaceId::from(workspace),
            name: "Lab report v1".to_string(),
            document_type: DocumentType::LabReport,
            auto_populate: true,
            require_validation: true,
            active: true,
            created_at: chrono::Utc::now().naive_utc(),
            mappings: vec![
                FieldMapping {
                    id: Uuid::new_v4(),
                    template_id,
                    source_section: "labs".to_string(),
                    source_field: "test_name".to_string(),
                    target_table: "lab_results".to_string(),
                    target_field: "test_name".to_string(),
                    transformation_type: TransformationType::Direct,
                    field_type: FieldType::Text,
                    is_required: true,
                    processing_order: 20,
                    config: MappingConfig::default(),
                },
                FieldMapping {
                    id: Uuid::new_v4(),
                    template_id,
                    source_section: "labs".to_string(),
                    source_field: "value".to_string(),
                    target_table: "lab_results".to_string(),
                    target_field: "value".to_string(),
                    transformation_type: TransformationType::Direct,
                    field_type: FieldType::Number,
                    is_required: false,
                    processing_order: 10,
                    config: MappingConfig::default(),
                },
            ],
        }
    }

    #[test]
    fn insert_and_load_sorts_mappings() {
        let mut conn = open_memory_database().unwrap();
        let template = make_template("ws-1");
        insert_template(&mut conn, &template).unwrap();

        let loaded = get_template(&conn, &template.id).unwrap().unwrap();
        assert_eq!(loaded.mappings.len(), 2);
        // Sorted ascending by processing_order, not insertion order
        assert_eq!(loaded.mappings[0].processing_order, 10);
        assert_eq!(loaded.mappings[1].processing_order, 20);
    }

    #[test]
    fn find_active_template_by_type() {
        let mut conn = open_memory_database().unwrap();
        let mut inactive = make_template("ws-1");
        inactive.active = false;
        insert_template(&mut conn, &inactive).unwrap();

        assert!(find_active_template(&conn, &WorkspaceId::from("ws-1"), DocumentType::LabReport)
            .unwrap()
            .is_none());

        let active = make_template("ws-1");
        insert_template(&mut conn, &active).unwrap();
        let found = find_active_template(&conn, &WorkspaceId::from("ws-1"), DocumentType::LabReport)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, active.id);
    }

    #[test]
    fn update_replaces_mappings() {
        let mut conn = open_memory_database().unwrap();
        let mut template = make_template("ws-1");
        insert_template(&mut conn, &template).unwrap();

        template.mappings.truncate(1);
        template.name = "Lab report v2".to_string();
        update_template(&mut conn, &template).unwrap();

        let loaded = get_template(&conn, &template.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Lab report v2");
        assert_eq!(loaded.mappings.len(), 1);
    }

    #[test]
    fn delete_cascades_mappings() {
        let mut conn = open_memory_database().unwrap();
        let template = make_template("ws-1");
        insert_template(&mut conn, &template).unwrap();

        delete_template(&conn, &template.id).unwrap();

        let orphans: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM field_mappings WHERE template_id = ?1",
                params![template.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
        assert!(get_template(&conn, &template.id).unwrap().is_none());
    }

    #[test]
    fn delete_missing_errors() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            delete_template(&conn, &Uuid::new_v4()),
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
