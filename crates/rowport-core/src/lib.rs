//! Core contracts and helpers for Rowport.
//!
//! This crate defines the entity schema model, typed field values, the
//! model config derived from a schema, and the storage and entity-registry
//! contracts shared by the import and export pipelines.

pub mod config;
pub mod error;
pub mod registry;
pub mod schema;
pub mod store;
pub mod types;
pub mod validation;
pub mod value;

pub use config::{
    DEFAULT_MAX_EXPORT_ROWS, FieldConfig, ModelConfig, derive_model_config, exportable_fields,
    importable_fields,
};
pub use error::{Error, Result};
pub use registry::{EntityRegistry, ResolvedEntity, StaticRegistry};
pub use schema::{EntitySchema, FieldDef, FieldRules, SortSpec};
pub use store::{
    Filter, ORGANIZATION_COLUMN, RecordId, RecordStore, SelectQuery, StoreError, StoreResult,
    TenantScope,
};
pub use types::FieldKind;
pub use validation::{
    IssueSeverity, ValidationIssue, ValidationReport, entity_json_schema, validate_entity_json,
    validate_entity_schema,
};
pub use value::{FieldValue, Record, duplicate_key, record_key};
