use thiserror::Error;

use rowport_core::StoreError;

/// Errors emitted by the export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error("organization id is required")]
    MissingTenant,
    #[error("export is disabled for entity {0}")]
    ExportDisabled(String),
    #[error("field '{field}' is not exportable for entity {entity}")]
    UnknownField { entity: String, field: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export produced invalid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;
