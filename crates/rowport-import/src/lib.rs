//! CSV import pipeline for Rowport.
//!
//! Parses uploaded CSV text, validates caller column mappings against an
//! entity's model config, and settles every row into the record store
//! under one of three duplicate strategies.

pub mod entry;
pub mod errors;
pub mod mapping;
pub mod model;
pub mod parser;
pub mod processor;
pub mod transform;

pub use entry::{ImportRequest, ImportSettings, import_upload};
pub use errors::ImportError;
pub use mapping::{
    ColumnMapper, ColumnMapping, MappingReport, ResolvedMapping, parse_mappings_json,
    suggest_mappings,
};
pub use model::{
    AbortReason, DEFAULT_BATCH_SIZE, DEFAULT_ERROR_LIMIT, DuplicateStrategy, ImportOptions,
    ImportResult, RowError,
};
pub use parser::{ParsedCsv, ParsedRow, parse_csv, parse_csv_bytes};
pub use processor::{ImportProcessor, process_import};
pub use transform::TransformKind;
