use tracing::info;

use rowport_core::{EntityRegistry, RecordStore, derive_model_config};

use crate::errors::{ImportError, Result};
use crate::mapping::{ColumnMapper, parse_mappings_json};
use crate::model::{DuplicateStrategy, ImportOptions, ImportResult};
use crate::parser::parse_csv_bytes;
use crate::processor::ImportProcessor;

/// Upload as received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub entity: String,
    pub file: Vec<u8>,
    /// JSON array of `{sourceColumn, targetField, transform?}`.
    pub mappings_json: String,
    /// `skip`, `update` or `error`.
    pub duplicate_strategy: String,
    pub organization_id: String,
}

/// Engine tuning applied to every upload.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub error_limit: usize,
    pub batch_size: usize,
    pub validation_threads: usize,
    pub deadline: Option<std::time::Duration>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        let defaults = ImportOptions::new(DuplicateStrategy::Skip, String::new());
        Self {
            error_limit: defaults.error_limit,
            batch_size: defaults.batch_size,
            validation_threads: defaults.validation_threads,
            deadline: defaults.deadline,
        }
    }
}

/// Run an import for an uploaded file.
///
/// Preconditions are checked in order and reported before any row is
/// written: tenant, entity, import flag, strategy token, mapping JSON, file
/// structure, non-empty file, mapping against the header.
pub async fn import_upload(
    store: &dyn RecordStore,
    registry: &dyn EntityRegistry,
    request: &ImportRequest,
    settings: &ImportSettings,
) -> Result<ImportResult> {
    if request.organization_id.trim().is_empty() {
        return Err(ImportError::MissingTenant);
    }
    let resolved = registry
        .resolve(&request.entity)
        .ok_or_else(|| ImportError::EntityNotFound(request.entity.clone()))?;
    let mut config = derive_model_config(&resolved.schema);
    config.table_name = resolved.table_name;

    if !config.import_enabled {
        return Err(ImportError::ImportDisabled(config.entity));
    }

    let strategy: DuplicateStrategy = request.duplicate_strategy.parse()?;
    let mappings = parse_mappings_json(&request.mappings_json)?;

    let parsed = parse_csv_bytes(&request.file)?;
    if parsed.total_rows == 0 {
        return Err(ImportError::EmptyFile);
    }

    let mapping = ColumnMapper::new(mappings)
        .validate(&config, &parsed.headers)
        .map_err(ImportError::Configuration)?;

    info!(
        entity = %config.entity,
        organization_id = %request.organization_id,
        bytes = request.file.len(),
        rows = parsed.total_rows,
        "upload accepted"
    );

    let options = ImportOptions {
        duplicate_strategy: strategy,
        organization_id: request.organization_id.clone(),
        error_limit: settings.error_limit,
        batch_size: settings.batch_size,
        validation_threads: settings.validation_threads,
        deadline: settings.deadline,
    };
    let processor = ImportProcessor::new(options)?;
    Ok(processor.run(store, &parsed, &mapping, &config).await)
}
