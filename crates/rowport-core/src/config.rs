//! Derivation of per-entity import/export rules from a declared schema.

use serde::{Deserialize, Serialize};

use crate::schema::{EntitySchema, FieldRules, SortSpec};
use crate::types::FieldKind;

/// Export cap applied when an entity does not declare its own.
pub const DEFAULT_MAX_EXPORT_ROWS: usize = 10_000;

/// Import/export ruleset derived from an entity schema.
///
/// Always computed from the live schema; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub entity: String,
    pub table_name: String,
    pub import_enabled: bool,
    pub export_enabled: bool,
    pub max_export_rows: usize,
    /// Fields forming the natural key; empty disables duplicate detection.
    pub duplicate_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<SortSpec>,
    pub fields: Vec<FieldConfig>,
}

/// Participation and typing of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub importable: bool,
    pub exportable: bool,
    pub required: bool,
    #[serde(default, skip_serializing_if = "FieldRules::is_empty")]
    pub rules: FieldRules,
}

impl ModelConfig {
    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_duplicate_key(&self) -> bool {
        !self.duplicate_key.is_empty()
    }
}

/// Derive the model config of an entity.
///
/// Disabled entities produce a config with the corresponding flag off
/// rather than an error.
pub fn derive_model_config(schema: &EntitySchema) -> ModelConfig {
    let fields = schema
        .fields
        .iter()
        .map(|field| FieldConfig {
            name: field.name.clone(),
            label: field.label.clone().unwrap_or_else(|| field.name.clone()),
            kind: field.kind.clone(),
            importable: field.import && !field.system && !field.read_only,
            exportable: field.export && !field.sensitive,
            required: field.required,
            rules: field.rules.clone(),
        })
        .collect();

    let duplicate_key = if schema.duplicate_key.is_empty() {
        schema
            .fields
            .iter()
            .find(|field| field.unique)
            .map(|field| vec![field.name.clone()])
            .unwrap_or_default()
    } else {
        schema.duplicate_key.clone()
    };

    ModelConfig {
        entity: schema.entity.clone(),
        table_name: schema.table_name.clone(),
        import_enabled: schema.import_enabled,
        export_enabled: schema.export_enabled,
        max_export_rows: schema.max_export_rows.unwrap_or(DEFAULT_MAX_EXPORT_ROWS),
        duplicate_key,
        default_sort: schema.default_sort.clone(),
        fields,
    }
}

/// Names of exportable fields in declaration order.
pub fn exportable_fields(config: &ModelConfig) -> Vec<String> {
    config
        .fields
        .iter()
        .filter(|field| field.exportable)
        .map(|field| field.name.clone())
        .collect()
}

/// Names of importable fields in declaration order.
pub fn importable_fields(config: &ModelConfig) -> Vec<String> {
    config
        .fields
        .iter()
        .filter(|field| field.importable)
        .map(|field| field.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn contact_schema() -> EntitySchema {
        serde_json::from_value(json!({
            "entity": "contact",
            "table_name": "contacts",
            "fields": [
                {"name": "id", "kind": {"type": "text"}, "system": true},
                {"name": "email", "label": "Email", "kind": {"type": "text"}, "unique": true, "required": true},
                {"name": "code", "kind": {"type": "text"}, "unique": true},
                {"name": "password_hash", "kind": {"type": "text"}, "sensitive": true},
                {"name": "score", "kind": {"type": "integer"}, "read_only": true}
            ]
        }))
        .expect("parse schema")
    }

    #[test]
    fn classifies_fields() {
        let config = derive_model_config(&contact_schema());
        assert_eq!(importable_fields(&config), vec!["email", "code", "password_hash"]);
        assert_eq!(exportable_fields(&config), vec!["id", "email", "code", "score"]);
        assert_eq!(config.field("email").map(|f| f.label.as_str()), Some("Email"));
        assert_eq!(config.field("code").map(|f| f.label.as_str()), Some("code"));
    }

    #[test]
    fn duplicate_key_falls_back_to_first_unique_field() {
        let config = derive_model_config(&contact_schema());
        assert_eq!(config.duplicate_key, vec!["email"]);

        let mut schema = contact_schema();
        schema.duplicate_key = vec!["code".to_string()];
        assert_eq!(derive_model_config(&schema).duplicate_key, vec!["code"]);
    }

    #[test]
    fn disabled_entities_are_reported_not_rejected() {
        let mut schema = contact_schema();
        schema.import_enabled = false;
        let config = derive_model_config(&schema);
        assert!(!config.import_enabled);
        assert!(config.export_enabled);
        assert_eq!(config.max_export_rows, DEFAULT_MAX_EXPORT_ROWS);
    }

    #[test]
    fn derivation_is_deterministic() {
        let schema = contact_schema();
        assert_eq!(derive_model_config(&schema), derive_model_config(&schema));
    }
}
