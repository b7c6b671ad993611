use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::SortSpec;
use crate::value::{FieldValue, Record};

/// Column holding the tenant identifier in every backing table.
pub const ORGANIZATION_COLUMN: &str = "organization_id";

/// Tenant partition every storage call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub organization_id: String,
}

impl TenantScope {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
        }
    }
}

/// Store-assigned record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Equality filter on a stored field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: FieldValue,
}

/// Filtered, sorted and bounded selection of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub filters: Vec<Filter>,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
}

/// Storage failures, split by how the caller must react.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached; the current run must stop.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store refused a specific operation (constraint, bad value).
    #[error("rejected by store: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Generic record storage used by import and export.
///
/// Implementations must confine every call to `scope` and ignore
/// soft-deleted rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Look up existing records by natural key.
    ///
    /// `keys` holds one value tuple per key, aligned with `key_fields`. The
    /// result maps the canonical key (see [`crate::value::duplicate_key`])
    /// to the matching record id.
    async fn find_existing(
        &self,
        scope: &TenantScope,
        table: &str,
        key_fields: &[String],
        keys: &[Vec<FieldValue>],
    ) -> StoreResult<HashMap<String, RecordId>>;

    /// Insert records atomically, returning ids in input order.
    async fn insert_many(
        &self,
        scope: &TenantScope,
        table: &str,
        records: &[Record],
    ) -> StoreResult<Vec<RecordId>>;

    /// Overwrite the given fields of an existing record.
    async fn update(
        &self,
        scope: &TenantScope,
        table: &str,
        id: &RecordId,
        changes: &Record,
    ) -> StoreResult<()>;

    async fn select(
        &self,
        scope: &TenantScope,
        table: &str,
        query: &SelectQuery,
    ) -> StoreResult<Vec<Record>>;
}
