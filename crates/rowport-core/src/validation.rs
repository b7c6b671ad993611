use std::collections::BTreeSet;

use jsonschema::JSONSchema;
use regex::Regex;
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::EntitySchema;
use crate::types::FieldKind;

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// Structured validation issue with location and hint.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: String,
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ValidationIssue {
    /// Create a new validation issue.
    pub fn new(
        severity: IssueSeverity,
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            path: path.into(),
            message: message.into(),
            hint,
        }
    }

    pub fn error(code: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, path, message, None)
    }

    pub fn warning(
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(IssueSeverity::Warning, code, path, message, None)
    }
}

/// Aggregated validation report with errors and warnings.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true when there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    pub fn push_warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Whether any error carries `code`.
    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|issue| issue.code == code)
    }

    /// One line per error, for logs and CLI output.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|issue| format!("{} at {}: {}", issue.code, issue.path, issue.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Emit the JSON Schema for entity schema documents.
pub fn entity_json_schema() -> RootSchema {
    schema_for!(EntitySchema)
}

/// Validate a raw entity schema document against its JSON Schema.
pub fn validate_entity_json(document: &Value) -> Result<ValidationReport> {
    let schema = serde_json::to_value(entity_json_schema())
        .map_err(|err| Error::Other(err.to_string()))?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|err| Error::InvalidSchema(err.to_string()))?;

    let mut report = ValidationReport::default();
    if let Err(errors) = compiled.validate(document) {
        for error in errors {
            let path = error.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            report.push_error(ValidationIssue::error(
                "schema_violation",
                path,
                error.to_string(),
            ));
        }
    }

    Ok(report)
}

/// Validate internal consistency of an entity schema.
///
/// This checks:
/// - duplicate field names
/// - duplicate key fields exist
/// - enum fields declare at least one value
/// - rule patterns compile and bounds are ordered
pub fn validate_entity_schema(schema: &EntitySchema) -> Result<()> {
    if schema.entity.trim().is_empty() {
        return Err(Error::InvalidSchema("entity name is empty".to_string()));
    }
    if schema.table_name.trim().is_empty() {
        return Err(Error::InvalidSchema(format!(
            "table name is empty: {}",
            schema.entity
        )));
    }

    let mut names = BTreeSet::new();
    for field in &schema.fields {
        if !names.insert(field.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate field name: {}.{}",
                schema.entity, field.name
            )));
        }

        if let FieldKind::Enum { values } = &field.kind {
            if values.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "enum field has no values: {}.{}",
                    schema.entity, field.name
                )));
            }
        }

        if let Some(pattern) = &field.rules.pattern {
            Regex::new(pattern).map_err(|err| {
                Error::InvalidSchema(format!(
                    "invalid pattern for {}.{}: {err}",
                    schema.entity, field.name
                ))
            })?;
        }

        let rules = &field.rules;
        let length_inverted = matches!((rules.min_length, rules.max_length), (Some(min), Some(max)) if min > max);
        let range_inverted = matches!((rules.min, rules.max), (Some(min), Some(max)) if min > max);
        if length_inverted || range_inverted {
            return Err(Error::InvalidSchema(format!(
                "rule bounds inverted: {}.{}",
                schema.entity, field.name
            )));
        }
    }

    for key in &schema.duplicate_key {
        if !names.contains(key.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate key field not found: {}.{}",
                schema.entity, key
            )));
        }
    }

    if let Some(sort) = &schema.default_sort {
        if !names.contains(sort.field.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "default sort field not found: {}.{}",
                schema.entity, sort.field
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema(fields: Value) -> EntitySchema {
        serde_json::from_value(json!({
            "entity": "asset",
            "table_name": "assets",
            "fields": fields
        }))
        .expect("parse schema")
    }

    #[test]
    fn rejects_duplicate_fields() {
        let schema = schema(json!([
            {"name": "tag", "kind": {"type": "text"}},
            {"name": "tag", "kind": {"type": "integer"}}
        ]));
        assert!(matches!(
            validate_entity_schema(&schema),
            Err(Error::InvalidSchema(_))
        ));
    }

    #[test]
    fn rejects_unknown_duplicate_key() {
        let mut schema = schema(json!([{"name": "tag", "kind": {"type": "text"}}]));
        schema.duplicate_key = vec!["serial".to_string()];
        assert!(validate_entity_schema(&schema).is_err());
    }

    #[test]
    fn rejects_bad_patterns_and_empty_enums() {
        let bad_pattern = schema(json!([
            {"name": "tag", "kind": {"type": "text"}, "rules": {"pattern": "("}}
        ]));
        assert!(validate_entity_schema(&bad_pattern).is_err());

        let empty_enum = schema(json!([
            {"name": "status", "kind": {"type": "enum", "values": []}}
        ]));
        assert!(validate_entity_schema(&empty_enum).is_err());
    }

    #[test]
    fn json_documents_are_checked_structurally() {
        let report = validate_entity_json(&json!({"entity": "asset"})).expect("validate");
        assert!(!report.is_ok());
        assert!(report.has_error("schema_violation"));

        let report = validate_entity_json(&json!({
            "entity": "asset",
            "table_name": "assets",
            "fields": [{"name": "tag", "kind": {"type": "text"}}]
        }))
        .expect("validate");
        assert!(report.is_ok(), "unexpected issues: {report}");
    }
}
