use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rowport_core::{
    FieldValue, Record, RecordId, RecordStore, SelectQuery, StoreError, StoreResult, TenantScope,
    duplicate_key, record_key,
};

/// Row as held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: RecordId,
    pub organization_id: String,
    #[serde(default)]
    pub deleted: bool,
    pub values: Record,
}

/// Serializable content of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub tables: BTreeMap<String, Vec<StoredRow>>,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable_after: Option<usize>,
    calls: usize,
    reject: Option<(String, FieldValue)>,
}

/// In-process record store.
///
/// Used for tests and for file-backed CLI runs. Fault injection hooks
/// simulate connection loss and per-record rejections.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, Vec<StoredRow>>>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        Self {
            tables: RwLock::new(snapshot.tables),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn snapshot(&self) -> StoreResult<MemorySnapshot> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(MemorySnapshot {
            tables: tables.clone(),
        })
    }

    /// Make every call after the next `calls` successful ones fail as unavailable.
    pub fn fail_after(&self, calls: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.unavailable_after = Some(faults.calls + calls);
        }
    }

    /// Reject inserts and updates of records whose `field` equals `value`.
    pub fn reject_value(&self, field: impl Into<String>, value: FieldValue) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.reject = Some((field.into(), value));
        }
    }

    /// Insert a record directly, bypassing fault hooks.
    pub fn seed(&self, scope: &TenantScope, table: &str, values: Record) -> StoreResult<RecordId> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let id = RecordId(uuid::Uuid::new_v4().to_string());
        tables.entry(table.to_string()).or_default().push(StoredRow {
            id: id.clone(),
            organization_id: scope.organization_id.clone(),
            deleted: false,
            values,
        });
        Ok(id)
    }

    pub fn soft_delete(&self, table: &str, id: &RecordId) -> StoreResult<bool> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| &row.id == id));
        Ok(match row {
            Some(row) => {
                row.deleted = true;
                true
            }
            None => false,
        })
    }

    /// Live rows of `table` within `scope`, in insertion order.
    pub fn rows(&self, scope: &TenantScope, table: &str) -> StoreResult<Vec<Record>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(live_rows(&tables, scope, table)
            .map(|row| row.values.clone())
            .collect())
    }

    fn check_available(&self) -> StoreResult<()> {
        let mut faults = self.faults.lock().map_err(|_| poisoned())?;
        if faults
            .unavailable_after
            .is_some_and(|limit| faults.calls >= limit)
        {
            return Err(StoreError::Unavailable("connection lost".to_string()));
        }
        faults.calls += 1;
        Ok(())
    }

    fn check_record(&self, record: &Record) -> StoreResult<()> {
        let faults = self.faults.lock().map_err(|_| poisoned())?;
        if let Some((field, value)) = &faults.reject {
            if record.get(field) == Some(value) {
                return Err(StoreError::Rejected(format!(
                    "value '{}' not allowed for {field}",
                    value.to_text()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn find_existing(
        &self,
        scope: &TenantScope,
        table: &str,
        key_fields: &[String],
        keys: &[Vec<FieldValue>],
    ) -> StoreResult<HashMap<String, RecordId>> {
        self.check_available()?;
        let wanted: HashSet<String> = keys
            .iter()
            .filter_map(|key| duplicate_key(&key.iter().collect::<Vec<_>>()))
            .collect();

        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut found = HashMap::new();
        for row in live_rows(&tables, scope, table) {
            if let Some(key) = record_key(&row.values, key_fields) {
                if wanted.contains(&key) {
                    found.entry(key).or_insert_with(|| row.id.clone());
                }
            }
        }
        Ok(found)
    }

    async fn insert_many(
        &self,
        scope: &TenantScope,
        table: &str,
        records: &[Record],
    ) -> StoreResult<Vec<RecordId>> {
        self.check_available()?;
        for record in records {
            self.check_record(record)?;
        }

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let rows = tables.entry(table.to_string()).or_default();
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = RecordId(uuid::Uuid::new_v4().to_string());
            rows.push(StoredRow {
                id: id.clone(),
                organization_id: scope.organization_id.clone(),
                deleted: false,
                values: record.clone(),
            });
            ids.push(id);
        }
        debug!(table, inserted = ids.len(), "memory insert");
        Ok(ids)
    }

    async fn update(
        &self,
        scope: &TenantScope,
        table: &str,
        id: &RecordId,
        changes: &Record,
    ) -> StoreResult<()> {
        self.check_available()?;
        self.check_record(changes)?;

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let row = tables.get_mut(table).and_then(|rows| {
            rows.iter_mut().find(|row| {
                &row.id == id && !row.deleted && row.organization_id == scope.organization_id
            })
        });
        let Some(row) = row else {
            return Err(StoreError::Rejected(format!("record {id} not found")));
        };
        for (field, value) in changes {
            row.values.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn select(
        &self,
        scope: &TenantScope,
        table: &str,
        query: &SelectQuery,
    ) -> StoreResult<Vec<Record>> {
        self.check_available()?;
        let tables = self.tables.read().map_err(|_| poisoned())?;

        let mut rows: Vec<&StoredRow> = live_rows(&tables, scope, table)
            .filter(|row| {
                query.filters.iter().all(|filter| {
                    row.values
                        .get(&filter.field)
                        .is_some_and(|value| value.to_text() == filter.value.to_text())
                })
            })
            .collect();

        if let Some(sort) = &query.sort {
            let null = FieldValue::Null;
            rows.sort_by(|left, right| {
                let left = left.values.get(&sort.field).unwrap_or(&null);
                let right = right.values.get(&sort.field).unwrap_or(&null);
                let ordering = left.compare(right);
                if sort.descending && !left.is_null() && !right.is_null() {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|row| {
                let mut record = row.values.clone();
                record
                    .entry("id".to_string())
                    .or_insert_with(|| FieldValue::Text(row.id.0.clone()));
                record
            })
            .collect())
    }
}

fn live_rows<'a>(
    tables: &'a BTreeMap<String, Vec<StoredRow>>,
    scope: &'a TenantScope,
    table: &str,
) -> impl Iterator<Item = &'a StoredRow> + 'a {
    tables
        .get(table)
        .map(|rows| rows.as_slice())
        .unwrap_or_default()
        .iter()
        .filter(move |row| !row.deleted && row.organization_id == scope.organization_id)
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}
