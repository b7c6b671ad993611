//! CSV export for tenant-scoped entity records.
//!
//! [`export_entity`] resolves the entity, queries the store within the
//! caller's tenant and serializes the rows with [`ExportWriter`].

pub mod csv;
pub mod engine;
pub mod errors;
pub mod model;

pub use crate::csv::{ExportWriter, UTF8_BOM, generate};
pub use engine::{export_entity, export_filename, resolve_columns};
pub use errors::{ExportError, Result};
pub use model::{ExportColumn, ExportOutput, ExportRequest};
