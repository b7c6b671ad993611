use thiserror::Error;

use crate::mapping::MappingReport;

/// Errors that stop an import before or instead of row processing.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error("organization id is required")]
    MissingTenant,
    #[error("import is disabled for entity '{0}'")]
    ImportDisabled(String),
    #[error("invalid column mapping: {0}")]
    Configuration(MappingReport),
    #[error("invalid duplicate strategy '{0}' (expected skip, update or error)")]
    InvalidStrategy(String),
    #[error("invalid mapping json: {0}")]
    InvalidMappingJson(#[from] serde_json::Error),
    #[error("malformed file: {0}")]
    MalformedFile(String),
    #[error("file contains no data rows")]
    EmptyFile,
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl ImportError {
    /// Configuration-level errors block a run before any row is read.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ImportError::EntityNotFound(_)
                | ImportError::MissingTenant
                | ImportError::ImportDisabled(_)
                | ImportError::Configuration(_)
                | ImportError::InvalidStrategy(_)
                | ImportError::InvalidMappingJson(_)
        )
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::MalformedFile(err.to_string())
    }
}

/// Result type for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;
