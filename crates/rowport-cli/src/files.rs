use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use rowport_core::{EntitySchema, StaticRegistry, validate_entity_json};

use crate::errors::{CliError, CliResult};

/// Load entity schemas from a JSON file holding one schema or an array.
pub fn load_registry(path: &Path) -> CliResult<StaticRegistry> {
    let content = std::fs::read_to_string(path)?;
    parse_registry(&content).map_err(|err| match err {
        CliError::InvalidConfig(message) => {
            CliError::InvalidConfig(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

pub fn parse_registry(content: &str) -> CliResult<StaticRegistry> {
    let documents = match serde_json::from_str::<Value>(content)? {
        Value::Array(items) => items,
        single => vec![single],
    };

    let mut schemas = Vec::with_capacity(documents.len());
    for (idx, document) in documents.into_iter().enumerate() {
        let report = validate_entity_json(&document)?;
        if !report.is_ok() {
            return Err(CliError::InvalidConfig(format!(
                "schema #{idx}: {}",
                report.summary()
            )));
        }
        schemas.push(serde_json::from_value::<EntitySchema>(document)?);
    }
    Ok(StaticRegistry::from_schemas(schemas)?)
}

/// Read `value` verbatim, or the file it names when prefixed with `@`.
pub fn read_inline_or_file(value: &str) -> CliResult<String> {
    match value.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(value.to_string()),
    }
}

/// Replace `path` with `data` through a temporary sibling file.
pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> CliResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> CliResult<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| CliError::InvalidConfig(format!("invalid output path {}", path.display())))?;
    let tmp_name = format!("{}.tmp", file_name.to_string_lossy());
    Ok(path.with_file_name(tmp_name))
}
