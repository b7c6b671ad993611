use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ImportError;

/// Default number of row errors returned in an [`ImportResult`].
pub const DEFAULT_ERROR_LIMIT: usize = 100;

/// Default number of rows resolved and written per store round trip.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Policy applied when an imported row matches an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    Skip,
    Update,
    Error,
}

impl FromStr for DuplicateStrategy {
    type Err = ImportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "skip" => Ok(DuplicateStrategy::Skip),
            "update" => Ok(DuplicateStrategy::Update),
            "error" => Ok(DuplicateStrategy::Error),
            other => Err(ImportError::InvalidStrategy(other.to_string())),
        }
    }
}

/// Options for a single import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    pub duplicate_strategy: DuplicateStrategy,
    /// Tenant every lookup and insert is scoped to.
    pub organization_id: String,
    /// Maximum row errors kept in the result; counts stay exact.
    pub error_limit: usize,
    pub batch_size: usize,
    /// Worker threads used for row validation; `1` validates inline.
    pub validation_threads: usize,
    /// Wall-clock budget; the partial result is returned once exceeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Duration>,
}

impl ImportOptions {
    pub fn new(duplicate_strategy: DuplicateStrategy, organization_id: impl Into<String>) -> Self {
        Self {
            duplicate_strategy,
            organization_id: organization_id.into(),
            error_limit: DEFAULT_ERROR_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            validation_threads: 4,
            deadline: None,
        }
    }
}

/// Row-scoped failure traceable to the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row_number: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl RowError {
    pub fn row(row_number: usize, message: impl Into<String>) -> Self {
        Self {
            row_number,
            field: None,
            message: message.into(),
        }
    }

    pub fn field(row_number: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            row_number,
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

/// Why a run stopped before reaching the last row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    StoreUnavailable { message: String },
    DeadlineExceeded,
}

/// Summary of an import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    /// `false` when the run aborted before every row was settled.
    pub success: bool,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub inserted_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub errors: Vec<RowError>,
    /// Set when `errors` was cut at the configured limit.
    pub errors_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortReason>,
    pub duration_ms: u64,
}

impl ImportResult {
    pub fn new(total_rows: usize) -> Self {
        Self {
            success: false,
            total_rows,
            processed_rows: 0,
            inserted_count: 0,
            updated_count: 0,
            skipped_count: 0,
            error_count: 0,
            errors: Vec::new(),
            errors_truncated: false,
            aborted: None,
            duration_ms: 0,
        }
    }

    /// Sum of the per-outcome counters.
    pub fn settled_rows(&self) -> usize {
        self.inserted_count + self.updated_count + self.skipped_count + self.error_count
    }
}

/// Row error list bounded by a limit while counting every entry.
#[derive(Debug, Clone)]
pub(crate) struct ErrorSink {
    limit: usize,
    errors: Vec<RowError>,
    truncated: bool,
}

impl ErrorSink {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            errors: Vec::new(),
            truncated: false,
        }
    }

    pub(crate) fn push(&mut self, error: RowError) {
        if self.errors.len() < self.limit {
            self.errors.push(error);
        } else {
            self.truncated = true;
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<RowError>, bool) {
        (self.errors, self.truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_tokens_parse_case_insensitively() {
        assert_eq!("Skip".parse::<DuplicateStrategy>().ok(), Some(DuplicateStrategy::Skip));
        assert_eq!(" update ".parse::<DuplicateStrategy>().ok(), Some(DuplicateStrategy::Update));
        assert!(matches!(
            "merge".parse::<DuplicateStrategy>(),
            Err(ImportError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn error_sink_caps_at_limit() {
        let mut sink = ErrorSink::new(2);
        sink.push(RowError::row(1, "a"));
        sink.push(RowError::row(2, "b"));
        let (errors, truncated) = sink.clone().into_parts();
        assert_eq!(errors.len(), 2);
        assert!(!truncated);

        sink.push(RowError::row(3, "c"));
        let (errors, truncated) = sink.into_parts();
        assert_eq!(errors.len(), 2);
        assert!(truncated);
    }

    #[test]
    fn result_serializes_in_camel_case() {
        let result = ImportResult::new(3);
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["totalRows"], 3);
        assert_eq!(json["insertedCount"], 0);
        assert!(json.get("aborted").is_none());
    }
}
