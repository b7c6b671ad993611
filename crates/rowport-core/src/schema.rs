use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::FieldKind;

/// Declared schema of an importable/exportable entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntitySchema {
    /// Entity identifier used by callers (e.g. `invoice`).
    pub entity: String,
    /// Backing table in the record store.
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub import_enabled: bool,
    #[serde(default = "default_true")]
    pub export_enabled: bool,
    /// Upper bound on exported rows; falls back to the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_export_rows: Option<usize>,
    /// Explicit natural key used for duplicate detection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicate_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<SortSpec>,
    pub fields: Vec<FieldDef>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// A single field declaration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    /// Managed by the platform (ids, audit columns); never imported.
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Holds secrets or personal data; never exported.
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default = "default_true")]
    pub import: bool,
    #[serde(default = "default_true")]
    pub export: bool,
    #[serde(default, skip_serializing_if = "FieldRules::is_empty")]
    pub rules: FieldRules,
}

/// Validation rules checked after a value has been coerced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Regular expression the text form must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl FieldRules {
    pub fn is_empty(&self) -> bool {
        self == &FieldRules::default()
    }
}

/// Sort order for exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortSpec {
    /// Parse `field` or `field:asc|desc`.
    pub fn parse(value: &str) -> Option<SortSpec> {
        let (field, direction) = match value.split_once(':') {
            Some((field, direction)) => (field.trim(), direction.trim().to_lowercase()),
            None => (value.trim(), "asc".to_string()),
        };
        if field.is_empty() {
            return None;
        }
        let descending = match direction.as_str() {
            "asc" => false,
            "desc" => true,
            _ => return None,
        };
        Some(SortSpec {
            field: field.to_string(),
            descending,
        })
    }
}

fn default_true() -> bool {
    true
}
