use std::time::Instant;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use rowport_core::{
    EntityRegistry, ModelConfig, RecordStore, SelectQuery, TenantScope, derive_model_config,
    exportable_fields,
};

use crate::csv::ExportWriter;
use crate::errors::{ExportError, Result};
use crate::model::{ExportColumn, ExportOutput, ExportRequest};

/// Download filename for an export of `entity` produced on `date`.
pub fn export_filename(entity: &str, date: NaiveDate) -> String {
    format!("{entity}_export_{}.csv", date.format("%Y-%m-%d"))
}

/// Columns for `fields`, or every exportable field in declared order.
pub fn resolve_columns(config: &ModelConfig, fields: Option<&[String]>) -> Result<Vec<ExportColumn>> {
    let names = match fields {
        Some(fields) => fields.to_vec(),
        None => exportable_fields(config),
    };
    names
        .iter()
        .map(|name| match config.field(name) {
            Some(field) if field.exportable => Ok(ExportColumn {
                name: field.name.clone(),
                label: field.label.clone(),
                kind: field.kind.clone(),
            }),
            _ => Err(unknown_field(config, name)),
        })
        .collect()
}

/// Export the caller's records of `entity` as CSV.
///
/// Requests above the entity's `max_export_rows` are cut at the cap and
/// flagged as truncated.
pub async fn export_entity(
    store: &dyn RecordStore,
    registry: &dyn EntityRegistry,
    entity: &str,
    request: &ExportRequest,
) -> Result<ExportOutput> {
    let start = Instant::now();
    if request.organization_id.trim().is_empty() {
        return Err(ExportError::MissingTenant);
    }
    let resolved = registry
        .resolve(entity)
        .ok_or_else(|| ExportError::EntityNotFound(entity.to_string()))?;
    let mut config = derive_model_config(&resolved.schema);
    config.table_name = resolved.table_name;

    if !config.export_enabled {
        return Err(ExportError::ExportDisabled(config.entity));
    }

    let columns = resolve_columns(&config, request.fields.as_deref())?;
    for filter in &request.filters {
        if !config.field(&filter.field).is_some_and(|field| field.exportable) {
            return Err(unknown_field(&config, &filter.field));
        }
    }
    let sort = request.sort.clone().or_else(|| config.default_sort.clone());
    if let Some(sort) = &sort {
        if !config.field(&sort.field).is_some_and(|field| field.exportable) {
            return Err(unknown_field(&config, &sort.field));
        }
    }

    let cap = config.max_export_rows;
    let capped = request.limit.is_none_or(|limit| limit >= cap);
    let limit = request.limit.map_or(cap, |limit| limit.min(cap));
    let query = SelectQuery {
        filters: request.filters.clone(),
        sort,
        // One extra row tells whether the cap cut anything off.
        limit: Some(if capped { limit.saturating_add(1) } else { limit }),
    };

    let scope = TenantScope::new(request.organization_id.clone());
    let mut records = store.select(&scope, &config.table_name, &query).await?;
    let truncated = capped && records.len() > cap;
    records.truncate(limit);
    debug!(entity = %config.entity, rows = records.len(), truncated, "export rows selected");

    let mut writer = ExportWriter::new(Vec::new(), &columns)?;
    for record in &records {
        writer.write_record(record)?;
    }
    let row_count = writer.rows_written();
    let (buffer, bytes) = writer.finish()?;
    let csv = String::from_utf8(buffer)?;

    let filename = export_filename(&config.entity, Utc::now().date_naive());
    info!(
        event = "export_finished",
        entity = %config.entity,
        organization_id = %scope.organization_id,
        rows = row_count,
        truncated,
        bytes,
        duration_ms = start.elapsed().as_millis() as u64,
        "export finished"
    );

    Ok(ExportOutput {
        content_disposition: format!("attachment; filename=\"{filename}\""),
        filename,
        csv,
        row_count,
        truncated,
    })
}

fn unknown_field(config: &ModelConfig, field: &str) -> ExportError {
    ExportError::UnknownField {
        entity: config.entity.clone(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rowport_core::{EntitySchema, FieldKind};
    use serde_json::json;

    use super::*;

    fn config() -> ModelConfig {
        let schema: EntitySchema = serde_json::from_value(json!({
            "entity": "contacts",
            "table_name": "contacts",
            "fields": [
                {"name": "email", "label": "Email", "kind": {"type": "text"}},
                {"name": "ssn", "kind": {"type": "text"}, "sensitive": true},
                {"name": "age", "kind": {"type": "integer"}}
            ]
        }))
        .expect("schema");
        derive_model_config(&schema)
    }

    #[test]
    fn filename_uses_entity_and_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).expect("date");
        assert_eq!(export_filename("contacts", date), "contacts_export_2024-01-31.csv");
    }

    #[test]
    fn default_columns_skip_sensitive_fields() {
        let columns = resolve_columns(&config(), None).expect("columns");
        let names: Vec<&str> = columns.iter().map(|col| col.name.as_str()).collect();
        assert_eq!(names, ["email", "age"]);
        assert_eq!(columns[0].label, "Email");
        assert_eq!(columns[1].kind, FieldKind::Integer);
    }

    #[test]
    fn requested_sensitive_field_is_rejected() {
        let fields = vec!["ssn".to_string()];
        let err = resolve_columns(&config(), Some(&fields)).expect_err("sensitive");
        assert!(matches!(err, ExportError::UnknownField { field, .. } if field == "ssn"));
    }
}
