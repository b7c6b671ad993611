use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use rowport_core::{
    FieldConfig, FieldRules, FieldValue, ModelConfig, Record, ValidationIssue, ValidationReport,
};

use crate::errors::Result;
use crate::model::RowError;
use crate::parser::ParsedRow;
use crate::transform::TransformKind;

/// Configuration issues found while checking a mapping set.
pub type MappingReport = ValidationReport;

/// Source column to target field assignment supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub source_column: String,
    pub target_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformKind>,
}

impl ColumnMapping {
    pub fn new(source_column: impl Into<String>, target_field: impl Into<String>) -> Self {
        Self {
            source_column: source_column.into(),
            target_field: target_field.into(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: TransformKind) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Parse the JSON-encoded mapping list sent by the upload form.
pub fn parse_mappings_json(json: &str) -> Result<Vec<ColumnMapping>> {
    Ok(serde_json::from_str(json)?)
}

/// Propose mappings for headers that match an importable field name or label.
///
/// Matching ignores case and surrounding whitespace.
pub fn suggest_mappings(config: &ModelConfig, headers: &[String]) -> Vec<ColumnMapping> {
    let mut taken = HashSet::new();
    let mut mappings = Vec::new();
    for header in headers {
        let wanted = header.trim().to_lowercase();
        let field = config.fields.iter().filter(|field| field.importable).find(|field| {
            field.name.to_lowercase() == wanted || field.label.to_lowercase() == wanted
        });
        if let Some(field) = field {
            if taken.insert(field.name.clone()) {
                mappings.push(ColumnMapping::new(header.clone(), field.name.clone()));
            }
        }
    }
    mappings
}

/// Validates caller mappings against a model config and file header.
#[derive(Debug, Clone)]
pub struct ColumnMapper {
    mappings: Vec<ColumnMapping>,
}

impl ColumnMapper {
    pub fn new(mappings: Vec<ColumnMapping>) -> Self {
        Self { mappings }
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    /// Check every mapping before any row is processed.
    ///
    /// All problems are collected into one report; any error rejects the
    /// whole mapping set.
    pub fn validate(
        &self,
        config: &ModelConfig,
        headers: &[String],
    ) -> std::result::Result<ResolvedMapping, MappingReport> {
        let mut report = MappingReport::default();
        let mut targets = HashSet::new();
        let mut columns = Vec::with_capacity(self.mappings.len());

        if self.mappings.is_empty() {
            report.push_error(ValidationIssue::error(
                "mappings_empty",
                "/mappings",
                "at least one column mapping is required",
            ));
        }

        for (idx, mapping) in self.mappings.iter().enumerate() {
            let base_path = format!("/mappings/{idx}");

            if !targets.insert(mapping.target_field.as_str()) {
                report.push_error(ValidationIssue::error(
                    "duplicate_target",
                    format!("{base_path}/targetField"),
                    format!("field '{}' is mapped more than once", mapping.target_field),
                ));
                continue;
            }

            let header_index = headers
                .iter()
                .position(|header| header == &mapping.source_column);
            if header_index.is_none() {
                report.push_error(ValidationIssue::error(
                    "missing_source_column",
                    format!("{base_path}/sourceColumn"),
                    format!("column '{}' is not in the file header", mapping.source_column),
                ));
            }

            let field = config.field(&mapping.target_field).filter(|field| field.importable);
            let Some(field) = field else {
                report.push_error(ValidationIssue::error(
                    "unknown_target",
                    format!("{base_path}/targetField"),
                    format!(
                        "field '{}' does not exist or is not importable",
                        mapping.target_field
                    ),
                ));
                continue;
            };

            if let Some(transform) = &mapping.transform {
                if !transform.supports(&field.kind) {
                    report.push_error(ValidationIssue::error(
                        "transform_mismatch",
                        format!("{base_path}/transform"),
                        format!(
                            "transform '{}' cannot produce a {} value for '{}'",
                            transform.name(),
                            field.kind.name(),
                            field.name
                        ),
                    ));
                    continue;
                }
            }

            let rules = match CompiledRules::compile(&field.rules) {
                Ok(rules) => rules,
                Err(message) => {
                    report.push_error(ValidationIssue::error(
                        "invalid_rule",
                        format!("{base_path}/targetField"),
                        message,
                    ));
                    continue;
                }
            };

            if let Some(header_index) = header_index {
                columns.push(ResolvedColumn {
                    header_index,
                    source_column: mapping.source_column.clone(),
                    field: field.clone(),
                    transform: mapping.transform.clone(),
                    rules,
                });
            }
        }

        for field in config.fields.iter().filter(|field| field.required && field.importable) {
            if !targets.contains(field.name.as_str()) {
                report.push_error(ValidationIssue::error(
                    "missing_required",
                    "/mappings",
                    format!("required field '{}' is not mapped", field.name),
                ));
            }
        }

        let key_mapped = config
            .duplicate_key
            .iter()
            .all(|key| targets.contains(key.as_str()));
        if !config.has_duplicate_key() || !key_mapped {
            report.push_warning(ValidationIssue::warning(
                "duplicate_detection_disabled",
                "/mappings",
                "duplicate key is not declared or not fully mapped; every valid row is inserted",
            ));
        }

        if !report.is_ok() {
            return Err(report);
        }

        let duplicate_key = if config.has_duplicate_key() && key_mapped {
            config.duplicate_key.clone()
        } else {
            Vec::new()
        };

        Ok(ResolvedMapping {
            columns,
            duplicate_key,
            warnings: report.warnings,
        })
    }
}

/// Mapping set checked against a config and header, ready for row processing.
#[derive(Debug, Clone)]
pub struct ResolvedMapping {
    columns: Vec<ResolvedColumn>,
    duplicate_key: Vec<String>,
    warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Clone)]
struct ResolvedColumn {
    header_index: usize,
    source_column: String,
    field: FieldConfig,
    transform: Option<TransformKind>,
    rules: CompiledRules,
}

impl ResolvedMapping {
    /// Key fields used for duplicate detection; empty when disabled.
    pub fn duplicate_key(&self) -> &[String] {
        &self.duplicate_key
    }

    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }

    pub fn target_fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.field.name.as_str())
    }

    /// Build the typed record for a row.
    ///
    /// Every mapped field is evaluated so a row reports all of its field
    /// errors at once.
    pub fn build_record(&self, row: &ParsedRow) -> std::result::Result<Record, Vec<RowError>> {
        let mut record = BTreeMap::new();
        let mut errors = Vec::new();

        for column in &self.columns {
            let raw = row.cell(column.header_index).unwrap_or_default();
            let field = &column.field;
            let coerced = match &column.transform {
                Some(transform) => transform.apply(raw, &field.kind),
                None => field.kind.coerce(raw),
            };

            let value = match coerced {
                Ok(value) => value,
                Err(message) => {
                    errors.push(RowError::field(
                        row.row_number,
                        &field.name,
                        format!("{} (column '{}')", message, column.source_column),
                    ));
                    continue;
                }
            };

            if value.is_null() {
                if field.required {
                    errors.push(RowError::field(
                        row.row_number,
                        &field.name,
                        format!("required field '{}' is empty", field.name),
                    ));
                    continue;
                }
            } else if let Err(message) = column.rules.check(&value) {
                errors.push(RowError::field(row.row_number, &field.name, message));
                continue;
            }

            record.insert(field.name.clone(), value);
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CompiledRules {
    min_length: Option<usize>,
    max_length: Option<usize>,
    min: Option<f64>,
    max: Option<f64>,
    pattern: Option<Regex>,
}

impl CompiledRules {
    fn compile(rules: &FieldRules) -> std::result::Result<Self, String> {
        let pattern = rules
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|err| format!("invalid pattern: {err}"))?;
        Ok(Self {
            min_length: rules.min_length,
            max_length: rules.max_length,
            min: rules.min,
            max: rules.max,
            pattern,
        })
    }

    fn check(&self, value: &FieldValue) -> std::result::Result<(), String> {
        if let Some(number) = value.as_f64() {
            if let Some(min) = self.min.filter(|min| number < *min) {
                return Err(format!("value {number} is below the minimum {min}"));
            }
            if let Some(max) = self.max.filter(|max| number > *max) {
                return Err(format!("value {number} is above the maximum {max}"));
            }
            return Ok(());
        }

        let text = value.to_text();
        let length = text.chars().count();
        if let Some(min) = self.min_length.filter(|min| length < *min) {
            return Err(format!("must be at least {min} characters"));
        }
        if let Some(max) = self.max_length.filter(|max| length > *max) {
            return Err(format!("must be at most {max} characters"));
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&text) {
                return Err(format!("'{text}' does not match pattern {}", pattern.as_str()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rowport_core::{EntitySchema, derive_model_config};
    use serde_json::json;

    use super::*;
    use crate::parser::parse_csv;

    fn config() -> ModelConfig {
        let schema: EntitySchema = serde_json::from_value(json!({
            "entity": "person",
            "table_name": "people",
            "fields": [
                {"name": "id", "kind": {"type": "text"}, "system": true, "required": true},
                {"name": "email", "label": "E-mail", "kind": {"type": "text"}, "unique": true, "required": true,
                 "rules": {"pattern": "^[^@]+@[^@]+$"}},
                {"name": "name", "kind": {"type": "text"}, "rules": {"max_length": 10}},
                {"name": "age", "kind": {"type": "integer"}, "rules": {"min": 0.0}},
                {"name": "active", "kind": {"type": "boolean"}}
            ]
        }))
        .expect("parse schema");
        derive_model_config(&schema)
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn collects_every_configuration_issue() {
        let mapper = ColumnMapper::new(vec![
            ColumnMapping::new("Name", "name"),
            ColumnMapping::new("Full name", "name"),
            ColumnMapping::new("Id", "id"),
            ColumnMapping::new("Missing", "age"),
            ColumnMapping::new("Active", "active").with_transform(TransformKind::Number),
        ]);
        let report = mapper
            .validate(&config(), &headers(&["Name", "Full name", "Id", "Active"]))
            .expect_err("mapping must be rejected");

        assert!(report.has_error("duplicate_target"));
        assert!(report.has_error("unknown_target"));
        assert!(report.has_error("missing_source_column"));
        assert!(report.has_error("transform_mismatch"));
        assert!(report.has_error("missing_required"));
    }

    #[test]
    fn system_required_fields_do_not_need_mapping() {
        let mapper = ColumnMapper::new(vec![ColumnMapping::new("Email", "email")]);
        let resolved = mapper
            .validate(&config(), &headers(&["Email"]))
            .expect("valid mapping");
        assert_eq!(resolved.duplicate_key(), ["email".to_string()]);
        assert!(resolved.warnings().is_empty());
    }

    #[test]
    fn reports_all_field_errors_of_a_row() {
        let parsed = parse_csv("Email,Name,Age\nnot-an-email,A very long name,-3\n").expect("parse");
        let mapper = ColumnMapper::new(vec![
            ColumnMapping::new("Email", "email"),
            ColumnMapping::new("Name", "name"),
            ColumnMapping::new("Age", "age"),
        ]);
        let resolved = mapper.validate(&config(), &parsed.headers).expect("valid mapping");

        let errors = resolved
            .build_record(&parsed.rows[0])
            .expect_err("row must fail");
        let fields: Vec<_> = errors.iter().filter_map(|err| err.field.as_deref()).collect();
        assert_eq!(fields, vec!["email", "name", "age"]);
        assert!(errors.iter().all(|err| err.row_number == 1));
    }

    #[test]
    fn empty_required_value_is_a_row_error() {
        let parsed = parse_csv("Email,Active\n,yes\n").expect("parse");
        let mapper = ColumnMapper::new(vec![
            ColumnMapping::new("Email", "email"),
            ColumnMapping::new("Active", "active"),
        ]);
        let resolved = mapper.validate(&config(), &parsed.headers).expect("valid mapping");
        let errors = resolved.build_record(&parsed.rows[0]).expect_err("row must fail");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field.as_deref(), Some("email"));
    }

    #[test]
    fn suggests_mappings_by_name_or_label() {
        let suggested = suggest_mappings(&config(), &headers(&["E-mail", "AGE", "Unknown", "id"]));
        assert_eq!(
            suggested,
            vec![
                ColumnMapping::new("E-mail", "email"),
                ColumnMapping::new("AGE", "age"),
            ]
        );
    }

    #[test]
    fn mapping_json_uses_camel_case() {
        let mappings = parse_mappings_json(
            r#"[{"sourceColumn": "Joined", "targetField": "joined_on",
                 "transform": {"kind": "date", "format": "%d/%m/%Y"}}]"#,
        )
        .expect("parse mappings");
        assert_eq!(
            mappings[0].transform,
            Some(TransformKind::Date {
                format: "%d/%m/%Y".to_string()
            })
        );
    }
}
