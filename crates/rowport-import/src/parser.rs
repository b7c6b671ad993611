use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::{ImportError, Result};

const BOM: char = '\u{feff}';

/// A data row keyed by the header of the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    /// 1-based position among data rows (header excluded).
    pub row_number: usize,
    headers: Arc<[String]>,
    cells: Vec<String>,
}

impl ParsedRow {
    /// Raw value of `column`; `None` when the column is not in the header.
    pub fn get(&self, column: &str) -> Option<&str> {
        let index = self.headers.iter().position(|header| header == column)?;
        self.cell(index)
    }

    /// Raw value at header position `index`.
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    /// Column/value pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter().map(String::as_str))
    }
}

/// Parsed CSV document.
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<ParsedRow>,
    pub total_rows: usize,
}

impl ParsedCsv {
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|header| header == column)
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == column)
    }
}

/// Decode an uploaded file and parse it.
pub fn parse_csv_bytes(bytes: &[u8]) -> Result<ParsedCsv> {
    let text = std::str::from_utf8(bytes).map_err(|err| {
        ImportError::MalformedFile(format!(
            "file is not valid UTF-8 (byte {})",
            err.valid_up_to()
        ))
    })?;
    parse_csv(text)
}

/// Parse CSV text into header-keyed rows.
///
/// The first non-blank record is the header. Blank records are skipped
/// and not counted. A header-only file is valid and yields zero rows.
pub fn parse_csv(text: &str) -> Result<ParsedCsv> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut headers: Option<Arc<[String]>> = None;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let Some(header) = &headers else {
            headers = Some(read_header(&record)?);
            continue;
        };

        let mut cells: Vec<String> = record
            .iter()
            .take(header.len())
            .map(str::to_string)
            .collect();
        cells.resize(header.len(), String::new());

        rows.push(ParsedRow {
            row_number: rows.len() + 1,
            headers: Arc::clone(header),
            cells,
        });
    }

    let headers = headers.ok_or_else(|| ImportError::MalformedFile("missing header row".to_string()))?;
    let total_rows = rows.len();

    Ok(ParsedCsv {
        headers: headers.to_vec(),
        rows,
        total_rows,
    })
}

fn read_header(record: &csv::StringRecord) -> Result<Arc<[String]>> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(record.len());
    for (idx, cell) in record.iter().enumerate() {
        let name = cell.trim().to_string();
        if name.is_empty() {
            return Err(ImportError::MalformedFile(format!(
                "header column {} is empty",
                idx + 1
            )));
        }
        if !seen.insert(name.clone()) {
            return Err(ImportError::MalformedFile(format!(
                "duplicate header column '{name}'"
            )));
        }
        names.push(name);
    }
    Ok(names.into())
}
