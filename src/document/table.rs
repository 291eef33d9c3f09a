//! Delimited text tables (`.csv`)

use tracing::debug;

use crate::core::errors::{Result, TranslationError};
use crate::document::{format_number, CellValue, DocumentKind};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One data row, one value per header column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub values: Vec<CellValue>,
}

impl Row {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }
}

/// A header plus data rows
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<CellValue>,
    pub rows: Vec<Row>,
    pub(crate) delimiter: u8,
}

fn deserialize_error(message: impl Into<String>) -> TranslationError {
    TranslationError::Deserialize {
        kind: DocumentKind::Table,
        message: message.into(),
    }
}

/// Classify a raw field. Numbers are only recognised when rendering them back
/// gives the exact same text, so untouched fields serialize byte-identically.
fn parse_field(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Empty;
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() && format_number(n) == raw => CellValue::Number(n),
        _ => CellValue::String(raw.to_string()),
    }
}

impl Table {
    pub fn new(header: Vec<CellValue>, rows: Vec<Row>) -> Self {
        Self {
            header,
            rows,
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    /// Header text of a column, or its 1-based position when unnamed
    pub fn column_name(&self, column: usize) -> String {
        self.header
            .get(column)
            .and_then(|v| v.display())
            .unwrap_or_else(|| (column + 1).to_string())
    }

    /// Parse UTF-8 delimited text with a header row
    pub fn from_csv(bytes: &[u8], delimiter: u8) -> Result<Self> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let header: Vec<CellValue> = reader
            .headers()
            .map_err(|e| deserialize_error(e.to_string()))?
            .iter()
            .map(|h| {
                if h.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::String(h.to_string())
                }
            })
            .collect();

        if header.is_empty() {
            return Err(deserialize_error("no header row"));
        }

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| deserialize_error(e.to_string()))?;
            if record.len() > header.len() {
                return Err(deserialize_error(format!(
                    "row {} has {} fields, header has {}",
                    i + 1,
                    record.len(),
                    header.len()
                )));
            }

            let mut values: Vec<CellValue> = record.iter().map(parse_field).collect();
            values.resize(header.len(), CellValue::Empty);
            rows.push(Row::new(values));
        }

        debug!("Read table: {} columns, {} rows", header.len(), rows.len());

        Ok(Self {
            header,
            rows,
            delimiter,
        })
    }

    /// Write UTF-8 delimited text: header, then rows, no index column
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        let render = |v: &CellValue| v.display().unwrap_or_default();

        writer
            .write_record(self.header.iter().map(render))
            .map_err(|e| TranslationError::Serialize {
                message: e.to_string(),
            })?;
        for row in &self.rows {
            writer
                .write_record(row.values.iter().map(render))
                .map_err(|e| TranslationError::Serialize {
                    message: e.to_string(),
                })?;
        }

        writer.into_inner().map_err(|e| TranslationError::Serialize {
            message: e.to_string(),
        })
    }
}
