use std::io::Write;

use rowport_core::{FieldValue, Record};

use crate::errors::Result;
use crate::model::ExportColumn;

/// Byte-order mark written ahead of the header so spreadsheets pick UTF-8.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Serialize `records` into a complete CSV document.
///
/// Does not enforce any row cap; callers bound the input.
pub fn generate(records: &[Record], columns: &[ExportColumn]) -> Result<String> {
    let mut writer = ExportWriter::new(Vec::new(), columns)?;
    for record in records {
        writer.write_record(record)?;
    }
    let (bytes, _) = writer.finish()?;
    Ok(String::from_utf8(bytes)?)
}

/// Streaming CSV writer with a fixed column layout.
pub struct ExportWriter<W: Write> {
    writer: ::csv::Writer<CountingWriter<W>>,
    columns: Vec<ExportColumn>,
    rows: usize,
}

impl<W: Write> ExportWriter<W> {
    /// Write the BOM and the header row of labels.
    pub fn new(inner: W, columns: &[ExportColumn]) -> Result<Self> {
        let mut counting = CountingWriter::new(inner);
        counting.write_all(UTF8_BOM)?;
        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(counting);

        let header: Vec<&str> = columns.iter().map(|col| col.label.as_str()).collect();
        writer.write_record(&header)?;

        Ok(Self {
            writer,
            columns: columns.to_vec(),
            rows: 0,
        })
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let cells: Vec<String> = self
            .columns
            .iter()
            .map(|col| match record.get(&col.name) {
                Some(value) => value.clone().conform(&col.kind).to_cell(&col.kind),
                None => FieldValue::Null.to_text(),
            })
            .collect();
        self.writer.write_record(&cells)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush and return the inner writer with the bytes written, BOM included.
    pub fn finish(mut self) -> Result<(W, u64)> {
        self.writer.flush()?;
        let counting = self.writer.into_inner().map_err(|err| err.into_error())?;
        let bytes = counting.bytes_written();
        Ok((counting.inner, bytes))
    }
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rowport_core::FieldKind;

    use super::*;

    fn column(name: &str, label: &str, kind: FieldKind) -> ExportColumn {
        ExportColumn {
            name: name.to_string(),
            label: label.to_string(),
            kind,
        }
    }

    #[test]
    fn writes_bom_header_and_formatted_cells() {
        let columns = vec![
            column("name", "Name", FieldKind::Text),
            column("cost", "Cost", FieldKind::Number { scale: Some(2) }),
            column("purchased_on", "Purchased On", FieldKind::Date),
            column("active", "Active", FieldKind::Boolean),
        ];
        let mut record = Record::new();
        record.insert("name".to_string(), "Desk, oak \"XL\"".into());
        record.insert("cost".to_string(), FieldValue::Number(120.5));
        record.insert(
            "purchased_on".to_string(),
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).expect("date")),
        );
        record.insert("active".to_string(), FieldValue::Boolean(true));

        let csv = generate(&[record], &columns).expect("generate");
        assert!(csv.starts_with('\u{feff}'));
        let mut lines = csv.trim_start_matches('\u{feff}').lines();
        assert_eq!(lines.next(), Some("Name,Cost,Purchased On,Active"));
        assert_eq!(
            lines.next(),
            Some("\"Desk, oak \"\"XL\"\"\",120.50,2024-03-01,true")
        );
    }

    #[test]
    fn missing_and_null_values_are_empty_cells() {
        let columns = vec![
            column("a", "A", FieldKind::Text),
            column("b", "B", FieldKind::Integer),
        ];
        let mut record = Record::new();
        record.insert("a".to_string(), FieldValue::Null);

        let csv = generate(&[record], &columns).expect("generate");
        assert!(csv.ends_with("A,B\n,\n"));
    }

    #[test]
    fn finish_counts_bytes_including_bom() {
        let columns = vec![column("a", "A", FieldKind::Text)];
        let mut writer = ExportWriter::new(Vec::new(), &columns).expect("writer");
        let mut record = Record::new();
        record.insert("a".to_string(), "x".into());
        writer.write_record(&record).expect("write");
        assert_eq!(writer.rows_written(), 1);

        let (buffer, bytes) = writer.finish().expect("finish");
        assert_eq!(bytes, (UTF8_BOM.len() + "A\nx\n".len()) as u64);
        assert_eq!(bytes, buffer.len() as u64);
    }
}
