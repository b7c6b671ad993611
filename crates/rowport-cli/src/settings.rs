use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rowport_import::{DEFAULT_BATCH_SIZE, DEFAULT_ERROR_LIMIT, ImportSettings};

use crate::errors::CliResult;

/// Settings file looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "rowport.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowportSettings {
    pub error_limit: usize,
    pub batch_size: usize,
    pub validation_threads: usize,
    pub import_timeout_secs: Option<u64>,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
    pub database_url: Option<String>,
}

impl Default for RowportSettings {
    fn default() -> Self {
        Self {
            error_limit: DEFAULT_ERROR_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            validation_threads: 4,
            import_timeout_secs: None,
            log_format: LogFormat::Pretty,
            log_file: None,
            database_url: None,
        }
    }
}

impl RowportSettings {
    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            error_limit: self.error_limit,
            batch_size: self.batch_size,
            validation_threads: self.validation_threads,
            deadline: self.import_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Load `explicit`, else `rowport.toml` when present, else defaults.
pub fn load_settings(explicit: Option<&Path>) -> CliResult<RowportSettings> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(DEFAULT_SETTINGS_FILE);
            if !path.exists() {
                return Ok(RowportSettings::default());
            }
            path
        }
    };
    let content = std::fs::read_to_string(&path)?;
    parse_settings(&content)
}

pub fn parse_settings(content: &str) -> CliResult<RowportSettings> {
    let settings: RowportSettings = toml::from_str(content)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let settings = parse_settings("").expect("parse");
        assert_eq!(settings, RowportSettings::default());
        assert_eq!(settings.error_limit, 100);
        assert!(settings.import_settings().deadline.is_none());
    }

    #[test]
    fn partial_file_overrides_selected_keys() {
        let settings = parse_settings(
            r#"
            error_limit = 25
            import_timeout_secs = 30
            log_format = "json"
            "#,
        )
        .expect("parse");
        assert_eq!(settings.error_limit, 25);
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(
            settings.import_settings().deadline,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(parse_settings("log_format = \"xml\"").is_err());
    }
}
