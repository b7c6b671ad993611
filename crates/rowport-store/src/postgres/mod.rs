use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use rowport_core::{
    FieldValue, ORGANIZATION_COLUMN, Record, RecordId, RecordStore, SelectQuery, StoreError,
    StoreResult, TenantScope, duplicate_key,
};

mod decode;
mod sql;

pub use sql::quote_ident;

use decode::record_from_json;
use sql::SqlBuilder;

/// Soft-delete marker column; rows with a value are invisible.
pub const DELETED_AT_COLUMN: &str = "deleted_at";

/// Store backed by PostgreSQL tables.
///
/// Every table must carry `id`, `organization_id` and `deleted_at` columns.
/// Duplicate keys are compared on their text rendering.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store using a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn scoped_where<'a>(builder: &mut SqlBuilder<'a>, scope: &'a TenantScope) {
    builder
        .push(" WHERE ")
        .push(&quote_ident(ORGANIZATION_COLUMN))
        .push(" = ")
        .push_text(&scope.organization_id)
        .push(" AND ")
        .push(&quote_ident(DELETED_AT_COLUMN))
        .push(" IS NULL");
}

#[async_trait::async_trait]
impl RecordStore for PostgresStore {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn find_existing(
        &self,
        scope: &TenantScope,
        table: &str,
        key_fields: &[String],
        keys: &[Vec<FieldValue>],
    ) -> StoreResult<HashMap<String, RecordId>> {
        let key_texts: Vec<Vec<String>> = keys
            .iter()
            .filter(|key| !key.is_empty() && key.iter().all(|value| !value.is_null()))
            .map(|key| key.iter().map(FieldValue::to_text).collect())
            .collect();
        if key_texts.is_empty() || key_fields.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder = SqlBuilder::new("SELECT id::text AS \"__id\"");
        for (idx, field) in key_fields.iter().enumerate() {
            builder.push(&format!(", {}::text AS \"__k{idx}\"", quote_ident(field)));
        }
        builder.push(" FROM ").push(&quote_ident(table));
        scoped_where(&mut builder, scope);
        builder.push(" AND (");
        for (row_idx, key) in key_texts.iter().enumerate() {
            if row_idx > 0 {
                builder.push(" OR ");
            }
            builder.push("(");
            for (idx, (field, text)) in key_fields.iter().zip(key).enumerate() {
                if idx > 0 {
                    builder.push(" AND ");
                }
                builder
                    .push(&quote_ident(field))
                    .push("::text = ")
                    .push_text(text);
            }
            builder.push(")");
        }
        builder.push(") ORDER BY id");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut found = HashMap::new();
        for row in rows {
            let id: String = row.try_get("__id").map_err(map_sqlx_error)?;
            let mut values = Vec::with_capacity(key_fields.len());
            for idx in 0..key_fields.len() {
                let value: Option<String> =
                    row.try_get(format!("__k{idx}").as_str()).map_err(map_sqlx_error)?;
                values.push(value.map(FieldValue::Text).unwrap_or(FieldValue::Null));
            }
            if let Some(key) = duplicate_key(&values.iter().collect::<Vec<_>>()) {
                found.entry(key).or_insert(RecordId(id));
            }
        }
        debug!(table, keys = key_texts.len(), found = found.len(), "postgres duplicate lookup");
        Ok(found)
    }

    async fn insert_many(
        &self,
        scope: &TenantScope,
        table: &str,
        records: &[Record],
    ) -> StoreResult<Vec<RecordId>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let columns: BTreeSet<&String> = records.iter().flat_map(|record| record.keys()).collect();

        let mut builder = SqlBuilder::new(format!(
            "INSERT INTO {} ({}",
            quote_ident(table),
            quote_ident(ORGANIZATION_COLUMN)
        ));
        for column in &columns {
            builder.push(", ").push(&quote_ident(column));
        }
        builder.push(") VALUES ");
        for (row_idx, record) in records.iter().enumerate() {
            if row_idx > 0 {
                builder.push(", ");
            }
            builder.push("(").push_text(&scope.organization_id);
            for column in &columns {
                builder.push(", ");
                match record.get(*column) {
                    Some(value) => {
                        builder.push_value(value);
                    }
                    None => {
                        builder.push("DEFAULT");
                    }
                }
            }
            builder.push(")");
        }
        builder.push(" RETURNING id::text");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map(RecordId)
                    .map_err(map_sqlx_error)
            })
            .collect()
    }

    async fn update(
        &self,
        scope: &TenantScope,
        table: &str,
        id: &RecordId,
        changes: &Record,
    ) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut builder = SqlBuilder::new(format!("UPDATE {} SET ", quote_ident(table)));
        for (idx, (column, value)) in changes.iter().enumerate() {
            if idx > 0 {
                builder.push(", ");
            }
            builder.push(&quote_ident(column)).push(" = ").push_value(value);
        }
        scoped_where(&mut builder, scope);
        builder.push(" AND id::text = ").push_text(&id.0);

        let done = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::Rejected(format!("record {id} not found")));
        }
        Ok(())
    }

    async fn select(
        &self,
        scope: &TenantScope,
        table: &str,
        query: &SelectQuery,
    ) -> StoreResult<Vec<Record>> {
        let mut builder = SqlBuilder::new(format!(
            "SELECT to_jsonb(t) AS \"row\" FROM {} t",
            quote_ident(table)
        ));
        scoped_where(&mut builder, scope);
        let filter_texts: Vec<String> = query
            .filters
            .iter()
            .map(|filter| filter.value.to_text())
            .collect();
        for (filter, text) in query.filters.iter().zip(&filter_texts) {
            builder
                .push(" AND ")
                .push(&quote_ident(&filter.field))
                .push("::text = ")
                .push_text(text);
        }
        if let Some(sort) = &query.sort {
            let direction = if sort.descending { "DESC" } else { "ASC" };
            builder.push(&format!(
                " ORDER BY {} {direction} NULLS LAST",
                quote_ident(&sort.field)
            ));
        }
        if let Some(limit) = query.limit {
            builder.push(&format!(" LIMIT {}", limit.min(i64::MAX as usize)));
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|row| {
                row.try_get::<serde_json::Value, _>("row")
                    .map(record_from_json)
                    .map_err(map_sqlx_error)
            })
            .collect()
    }
}

/// Connection-level failures abort a run; everything else is per operation.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Rejected(err.to_string()),
    }
}
