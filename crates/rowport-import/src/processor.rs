use std::collections::{HashMap, HashSet};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use rowport_core::{
    FieldValue, ModelConfig, Record, RecordId, RecordStore, StoreError, TenantScope, record_key,
};

use crate::errors::{ImportError, Result};
use crate::mapping::{ColumnMapper, ColumnMapping, ResolvedMapping};
use crate::model::{AbortReason, DuplicateStrategy, ErrorSink, ImportOptions, ImportResult, RowError};
use crate::parser::{ParsedCsv, ParsedRow};

/// Validate mappings and run an import in one call.
///
/// Configuration problems are returned as errors before any row is read;
/// everything after that is reported through the [`ImportResult`].
pub async fn process_import(
    store: &dyn RecordStore,
    parsed: &ParsedCsv,
    mappings: &[ColumnMapping],
    config: &ModelConfig,
    options: ImportOptions,
) -> Result<ImportResult> {
    if options.organization_id.trim().is_empty() {
        return Err(ImportError::MissingTenant);
    }
    if !config.import_enabled {
        return Err(ImportError::ImportDisabled(config.entity.clone()));
    }

    let resolved = ColumnMapper::new(mappings.to_vec())
        .validate(config, &parsed.headers)
        .map_err(ImportError::Configuration)?;

    let processor = ImportProcessor::new(options)?;
    Ok(processor.run(store, parsed, &resolved, config).await)
}

/// Orchestrates validation, duplicate resolution and batched writes.
#[derive(Debug)]
pub struct ImportProcessor {
    options: ImportOptions,
    pool: Option<rayon::ThreadPool>,
}

struct PendingRow {
    row_number: usize,
    record: Record,
    key: Option<String>,
}

struct RunState {
    result: ImportResult,
    errors: ErrorSink,
    pending: Vec<PendingRow>,
    pending_keys: HashSet<String>,
}

impl RunState {
    fn reject(&mut self, errors: Vec<RowError>) {
        self.result.error_count += 1;
        for error in errors {
            self.errors.push(error);
        }
    }
}

impl ImportProcessor {
    pub fn new(options: ImportOptions) -> Result<Self> {
        let pool = if options.validation_threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.validation_threads)
                .thread_name(|idx| format!("rowport-validate-{idx}"))
                .build()
                .map_err(|err| ImportError::WorkerPool(err.to_string()))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self { options, pool })
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Process every parsed row against `store`.
    ///
    /// Never fails: row problems become [`RowError`]s and infrastructure
    /// problems abort the run with the partial counts preserved.
    pub async fn run(
        &self,
        store: &dyn RecordStore,
        parsed: &ParsedCsv,
        mapping: &ResolvedMapping,
        config: &ModelConfig,
    ) -> ImportResult {
        let start = Instant::now();
        let scope = TenantScope::new(self.options.organization_id.clone());
        let mut state = RunState {
            result: ImportResult::new(parsed.total_rows),
            errors: ErrorSink::new(self.options.error_limit),
            pending: Vec::new(),
            pending_keys: HashSet::new(),
        };

        info!(
            event = "import_started",
            entity = %config.entity,
            organization_id = %scope.organization_id,
            engine = store.engine(),
            rows = parsed.total_rows,
            strategy = ?self.options.duplicate_strategy,
            duplicate_key = ?mapping.duplicate_key(),
            "import started"
        );
        for warning in mapping.warnings() {
            warn!(entity = %config.entity, code = %warning.code, "{}", warning.message);
        }

        let outcome = self
            .drive(store, &scope, &config.table_name, parsed, mapping, &mut state, start)
            .await;

        let RunState {
            mut result, errors, ..
        } = state;
        let (errors, truncated) = errors.into_parts();
        result.errors = errors;
        result.errors_truncated = truncated;
        result.processed_rows = result.settled_rows();
        result.aborted = outcome.err();
        result.success = result.aborted.is_none();
        result.duration_ms = start.elapsed().as_millis() as u64;

        match &result.aborted {
            None => info!(
                event = "import_finished",
                entity = %config.entity,
                organization_id = %scope.organization_id,
                inserted = result.inserted_count,
                updated = result.updated_count,
                skipped = result.skipped_count,
                errors = result.error_count,
                duration_ms = result.duration_ms,
                "import finished"
            ),
            Some(reason) => warn!(
                event = "import_aborted",
                entity = %config.entity,
                organization_id = %scope.organization_id,
                reason = ?reason,
                processed = result.processed_rows,
                total = result.total_rows,
                duration_ms = result.duration_ms,
                "import aborted"
            ),
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        store: &dyn RecordStore,
        scope: &TenantScope,
        table: &str,
        parsed: &ParsedCsv,
        mapping: &ResolvedMapping,
        state: &mut RunState,
        start: Instant,
    ) -> std::result::Result<(), AbortReason> {
        let batch_size = self.options.batch_size.max(1);
        let key_fields = mapping.duplicate_key();

        for chunk in parsed.rows.chunks(batch_size) {
            let validated = self.validate_chunk(mapping, chunk);

            for (row, outcome) in chunk.iter().zip(validated) {
                self.check_deadline(start)?;

                let record = match outcome {
                    Ok(record) => record,
                    Err(errors) => {
                        debug!(row = row.row_number, errors = errors.len(), "row failed validation");
                        state.reject(errors);
                        continue;
                    }
                };

                let key = record_key(&record, key_fields);
                if key.as_ref().is_some_and(|key| state.pending_keys.contains(key)) {
                    // Same key earlier in this batch: settle it first so file order wins.
                    self.flush(store, scope, table, key_fields, state).await?;
                }
                if let Some(key) = &key {
                    state.pending_keys.insert(key.clone());
                }
                state.pending.push(PendingRow {
                    row_number: row.row_number,
                    record,
                    key,
                });

                if state.pending.len() >= batch_size {
                    self.flush(store, scope, table, key_fields, state).await?;
                }
            }
        }

        self.check_deadline(start)?;
        self.flush(store, scope, table, key_fields, state).await
    }

    fn validate_chunk(
        &self,
        mapping: &ResolvedMapping,
        rows: &[ParsedRow],
    ) -> Vec<std::result::Result<Record, Vec<RowError>>> {
        match &self.pool {
            Some(pool) => pool.install(|| {
                rows.par_iter()
                    .map(|row| mapping.build_record(row))
                    .collect()
            }),
            None => rows.iter().map(|row| mapping.build_record(row)).collect(),
        }
    }

    fn check_deadline(&self, start: Instant) -> std::result::Result<(), AbortReason> {
        match self.options.deadline {
            Some(deadline) if start.elapsed() >= deadline => Err(AbortReason::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    async fn flush(
        &self,
        store: &dyn RecordStore,
        scope: &TenantScope,
        table: &str,
        key_fields: &[String],
        state: &mut RunState,
    ) -> std::result::Result<(), AbortReason> {
        if state.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut state.pending);
        state.pending_keys.clear();

        let keys: Vec<Vec<FieldValue>> = pending
            .iter()
            .filter(|row| row.key.is_some())
            .map(|row| {
                key_fields
                    .iter()
                    .map(|field| row.record.get(field).cloned().unwrap_or(FieldValue::Null))
                    .collect()
            })
            .collect();

        let existing: HashMap<String, RecordId> = if keys.is_empty() {
            HashMap::new()
        } else {
            match store.find_existing(scope, table, key_fields, &keys).await {
                Ok(found) => found,
                Err(StoreError::Unavailable(message)) => {
                    return Err(AbortReason::StoreUnavailable { message });
                }
                Err(StoreError::Rejected(message)) => {
                    warn!(table, error = %message, "duplicate lookup rejected");
                    for row in &pending {
                        state.reject(vec![RowError::row(
                            row.row_number,
                            format!("duplicate lookup failed: {message}"),
                        )]);
                    }
                    return Ok(());
                }
            }
        };

        let mut inserts = Vec::new();
        for row in pending {
            let existing_id = row.key.as_ref().and_then(|key| existing.get(key));
            let Some(id) = existing_id else {
                inserts.push(row);
                continue;
            };

            match self.options.duplicate_strategy {
                DuplicateStrategy::Skip => {
                    debug!(row = row.row_number, id = %id, "duplicate skipped");
                    state.result.skipped_count += 1;
                }
                DuplicateStrategy::Error => {
                    state.reject(vec![duplicate_error(row.row_number, key_fields, id)]);
                }
                DuplicateStrategy::Update => {
                    match store.update(scope, table, id, &row.record).await {
                        Ok(()) => state.result.updated_count += 1,
                        Err(StoreError::Rejected(message)) => {
                            state.reject(vec![RowError::row(
                                row.row_number,
                                format!("update failed: {message}"),
                            )]);
                        }
                        Err(StoreError::Unavailable(message)) => {
                            return Err(AbortReason::StoreUnavailable { message });
                        }
                    }
                }
            }
        }

        self.insert_rows(store, scope, table, inserts, state).await
    }

    async fn insert_rows(
        &self,
        store: &dyn RecordStore,
        scope: &TenantScope,
        table: &str,
        rows: Vec<PendingRow>,
        state: &mut RunState,
    ) -> std::result::Result<(), AbortReason> {
        if rows.is_empty() {
            return Ok(());
        }
        let records: Vec<Record> = rows.iter().map(|row| row.record.clone()).collect();

        let message = match store.insert_many(scope, table, &records).await {
            Ok(ids) => {
                debug!(table, inserted = ids.len(), "batch inserted");
                state.result.inserted_count += rows.len();
                return Ok(());
            }
            Err(StoreError::Unavailable(message)) => {
                return Err(AbortReason::StoreUnavailable { message });
            }
            Err(StoreError::Rejected(message)) => message,
        };

        if rows.len() == 1 {
            state.reject(vec![RowError::row(
                rows[0].row_number,
                format!("insert failed: {message}"),
            )]);
            return Ok(());
        }

        warn!(table, rows = rows.len(), error = %message, "batch insert rejected, retrying per row");
        for (row, record) in rows.iter().zip(records.chunks(1)) {
            match store.insert_many(scope, table, record).await {
                Ok(_) => state.result.inserted_count += 1,
                Err(StoreError::Rejected(message)) => {
                    state.reject(vec![RowError::row(
                        row.row_number,
                        format!("insert failed: {message}"),
                    )]);
                }
                Err(StoreError::Unavailable(message)) => {
                    return Err(AbortReason::StoreUnavailable { message });
                }
            }
        }
        Ok(())
    }
}

fn duplicate_error(row_number: usize, key_fields: &[String], id: &RecordId) -> RowError {
    let message = format!(
        "duplicate of existing record {id} (key: {})",
        key_fields.join(", ")
    );
    match key_fields {
        [field] => RowError::field(row_number, field, message),
        _ => RowError::row(row_number, message),
    }
}
