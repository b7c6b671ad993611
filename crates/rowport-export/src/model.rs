use serde::{Deserialize, Serialize};

use rowport_core::{FieldKind, Filter, SortSpec};

/// Output column: source field, header label and kind used for formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportColumn {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
}

/// Export parameters for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub organization_id: String,
    /// Subset and order of exported fields; all exportable fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Falls back to the entity's default sort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    /// Capped at the entity's `max_export_rows`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ExportRequest {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            ..Self::default()
        }
    }
}

/// Generated CSV ready to be served as a download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutput {
    pub filename: String,
    pub content_disposition: String,
    pub csv: String,
    pub row_count: usize,
    /// More rows matched than the entity's export cap allows.
    pub truncated: bool,
}
