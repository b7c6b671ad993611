use thiserror::Error;

use rowport_core::{Error as CoreError, StoreError};
use rowport_export::ExportError;
use rowport_import::ImportError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("import error: {0}")]
    Import(#[from] ImportError),
    #[error("export error: {0}")]
    Export(#[from] ExportError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("settings error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("import did not complete: {0}")]
    Aborted(String),
}

pub type CliResult<T> = std::result::Result<T, CliError>;
