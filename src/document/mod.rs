//! Tabular document model
//!
//! A [`Document`] is either a styled multi-sheet [`Workbook`] (`.xlsx`) or a
//! flat [`Table`] (`.csv`). Both expose their scalar values in a fixed
//! traversal order so the translation walker can treat them uniformly, while
//! serialization and column sizing stay shape-specific.

mod shared_strings;
mod styles;
pub mod table;
pub mod workbook;
mod worksheet;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::classifier::contains_cjk;
use crate::core::errors::{Result, TranslationError};
use styles::DateFormats;

pub use table::{Row, Table};
pub use workbook::{Workbook, XlsxError};

/// Spreadsheet MIME type
pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
/// Delimited text MIME type
pub const CSV_MEDIA_TYPE: &str = "text/csv";

/// Declared shape of a document, taken from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Workbook,
    Table,
}

impl DocumentKind {
    /// Map a file name to a kind by suffix (`.xlsx` or `.csv`, any case)
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".xlsx") {
            Ok(DocumentKind::Workbook)
        } else if lower.ends_with(".csv") {
            Ok(DocumentKind::Table)
        } else {
            Err(TranslationError::UnsupportedShape {
                file_name: file_name.to_string(),
            })
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            DocumentKind::Workbook => XLSX_MEDIA_TYPE,
            DocumentKind::Table => CSV_MEDIA_TYPE,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Workbook => "xlsx",
            DocumentKind::Table => "csv",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Workbook => write!(f, "workbook"),
            DocumentKind::Table => write!(f, "table"),
        }
    }
}

/// Scalar content of a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Bool(bool),
    /// Formula text without the leading `=`
    Formula(String),
    /// Error codes, ISO dates and anything else kept as raw text
    Other(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text a spreadsheet would show for the value; `None` when empty
    pub fn display(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::String(s) => Some(s.clone()),
            CellValue::Number(n) => Some(format_number(*n)),
            CellValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            CellValue::Formula(f) => Some(format!("={}", f)),
            CellValue::Other(s) => Some(s.clone()),
        }
    }

    /// Length in characters of the displayed text, 0 when there is none
    pub fn display_len(&self) -> usize {
        self.display().map(|s| s.chars().count()).unwrap_or(0)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Render a number the way a spreadsheet stores it: integral values without
/// a fractional part, everything else in shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Opaque style reference carried by a workbook cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellStyle(pub(crate) Option<u32>);

impl CellStyle {
    /// Index into the workbook's cell formats, if the cell has one
    pub fn index(&self) -> Option<u32> {
        self.0
    }
}

/// How a workbook cell stores its value on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellEncoding {
    /// `t="s"`: index into the shared strings table
    Shared,
    /// `t="inlineStr"`: text in an `<is>` child
    Inline,
    /// `t="str"`: text in a `<v>` child
    Str,
    /// Numbers, booleans, errors, formulas, empty cells
    Plain,
}

/// One cell of a sheet
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// 0-based column index
    pub column: u32,
    pub value: CellValue,
    pub style: CellStyle,
    pub(crate) original: CellValue,
    pub(crate) encoding: CellEncoding,
}

impl Cell {
    pub fn new(column: u32, value: CellValue) -> Self {
        let encoding = match value {
            CellValue::String(_) => CellEncoding::Inline,
            _ => CellEncoding::Plain,
        };
        Self {
            column,
            original: value.clone(),
            value,
            style: CellStyle::default(),
            encoding,
        }
    }

    /// Whether the value differs from what was read
    pub fn is_modified(&self) -> bool {
        self.value != self.original
    }
}

/// A row of sheet cells, sparse by column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    /// 0-based row index
    pub index: u32,
    pub cells: Vec<Cell>,
}

/// A `<col>` range as read from the sheet, attributes other than
/// `min`/`max` kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnRange {
    /// 1-based, inclusive
    pub min: u32,
    /// 1-based, inclusive
    pub max: u32,
    pub attributes: Vec<(String, String)>,
}

impl ColumnRange {
    fn width(&self) -> Option<f64> {
        self.attributes
            .iter()
            .find(|(k, _)| k == "width")
            .and_then(|(_, v)| v.parse().ok())
    }
}

/// A named 2-D grid of cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<SheetRow>,
    pub(crate) column_ranges: Vec<ColumnRange>,
    pub(crate) widths: BTreeMap<u32, f64>,
    pub(crate) part: String,
    pub(crate) dates: Arc<DateFormats>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build a sheet from dense rows; `Empty` values are skipped
    pub fn from_grid(name: impl Into<String>, grid: Vec<Vec<CellValue>>) -> Self {
        let mut sheet = Self::new(name);
        for (r, values) in grid.into_iter().enumerate() {
            let cells = values
                .into_iter()
                .enumerate()
                .filter(|(_, v)| !v.is_empty())
                .map(|(c, v)| Cell::new(c as u32, v))
                .collect();
            sheet.rows.push(SheetRow {
                index: r as u32,
                cells,
            });
        }
        sheet
    }

    pub fn cell(&self, row: u32, column: u32) -> Option<&Cell> {
        self.rows
            .iter()
            .find(|r| r.index == row)
            .and_then(|r| r.cells.iter().find(|c| c.column == column))
    }

    pub fn cells(&self) -> impl Iterator<Item = (u32, &Cell)> {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter().map(move |c| (r.index, c)))
    }

    /// Length of the text a spreadsheet shows for `cell`; numbers in a date
    /// format count as their date/time rendering
    pub fn display_len(&self, cell: &Cell) -> usize {
        if let CellValue::Number(n) = cell.value {
            if let Some(text) = self.dates.render(n, cell.style.index()) {
                return text.chars().count();
            }
        }
        cell.value.display_len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.iter().map(|r| r.index as usize + 1).max().unwrap_or(0)
    }

    /// One past the highest column index holding a cell
    pub fn column_count(&self) -> usize {
        self.cells()
            .map(|(_, c)| c.column as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Display width of a 0-based column: the reflowed width if set,
    /// otherwise the width the sheet was read with.
    pub fn column_width(&self, column: u32) -> Option<f64> {
        if let Some(width) = self.widths.get(&column) {
            return Some(*width);
        }
        let one_based = column + 1;
        self.column_ranges
            .iter()
            .find(|r| r.min <= one_based && one_based <= r.max)
            .and_then(ColumnRange::width)
    }

    pub fn set_column_width(&mut self, column: u32, width: f64) {
        self.widths.insert(column, width);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.widths.is_empty() || self.cells().any(|(_, c)| c.is_modified())
    }
}

/// A document of either shape
#[derive(Debug, Clone)]
pub enum Document {
    Workbook(Workbook),
    Table(Table),
}

/// A cell that still holds CJK text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakInfo {
    pub location: String,
    pub original: String,
}

impl Document {
    /// Parse raw bytes as the declared kind
    pub fn deserialize(bytes: &[u8], kind: DocumentKind, csv_delimiter: u8) -> Result<Self> {
        match kind {
            DocumentKind::Workbook => Workbook::from_bytes(bytes)
                .map(Document::Workbook)
                .map_err(|e| TranslationError::Deserialize {
                    kind,
                    message: e.to_string(),
                }),
            DocumentKind::Table => Table::from_csv(bytes, csv_delimiter).map(Document::Table),
        }
    }

    /// Write the document back to bytes in its native format
    pub fn serialize(&self) -> Result<Vec<u8>> {
        match self {
            Document::Workbook(workbook) => {
                workbook
                    .to_bytes()
                    .map_err(|e| TranslationError::Serialize {
                        message: e.to_string(),
                    })
            }
            Document::Table(table) => table.to_csv(),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Workbook(_) => DocumentKind::Workbook,
            Document::Table(_) => DocumentKind::Table,
        }
    }

    /// All scalar values in traversal order: sheets in order, rows top to
    /// bottom, columns left to right; a table's header comes first.
    pub fn values(&self) -> Box<dyn Iterator<Item = &CellValue> + '_> {
        match self {
            Document::Workbook(workbook) => Box::new(
                workbook
                    .sheets
                    .iter()
                    .flat_map(|s| s.cells().map(|(_, c)| &c.value)),
            ),
            Document::Table(table) => Box::new(
                table
                    .header
                    .iter()
                    .chain(table.rows.iter().flat_map(|r| r.values.iter())),
            ),
        }
    }

    /// Visit every scalar value mutably, in the same order as [`Document::values`]
    pub fn for_each_value_mut<F: FnMut(&mut CellValue)>(&mut self, mut f: F) {
        match self {
            Document::Workbook(workbook) => {
                for sheet in &mut workbook.sheets {
                    for row in &mut sheet.rows {
                        for cell in &mut row.cells {
                            f(&mut cell.value);
                        }
                    }
                }
            }
            Document::Table(table) => {
                for value in &mut table.header {
                    f(value);
                }
                for row in &mut table.rows {
                    for value in &mut row.values {
                        f(value);
                    }
                }
            }
        }
    }

    /// Cells whose text still contains CJK characters
    pub fn untranslated(&self) -> Vec<LeakInfo> {
        let mut leaks = Vec::new();
        match self {
            Document::Workbook(workbook) => {
                for sheet in &workbook.sheets {
                    for (row, cell) in sheet.cells() {
                        if let Some(text) = cell.value.as_str().filter(|s| contains_cjk(s)) {
                            leaks.push(LeakInfo {
                                location: format!(
                                    "{}!{}{}",
                                    sheet.name,
                                    column_letter(cell.column),
                                    row + 1
                                ),
                                original: text.to_string(),
                            });
                        }
                    }
                }
            }
            Document::Table(table) => {
                for (col, value) in table.header.iter().enumerate() {
                    if let Some(text) = value.as_str().filter(|s| contains_cjk(s)) {
                        leaks.push(LeakInfo {
                            location: format!("header, column {}", col + 1),
                            original: text.to_string(),
                        });
                    }
                }
                for (r, row) in table.rows.iter().enumerate() {
                    for (col, value) in row.values.iter().enumerate() {
                        if let Some(text) = value.as_str().filter(|s| contains_cjk(s)) {
                            leaks.push(LeakInfo {
                                location: format!(
                                    "row {}, column \"{}\"",
                                    r + 1,
                                    table.column_name(col)
                                ),
                                original: text.to_string(),
                            });
                        }
                    }
                }
            }
        }
        leaks
    }
}

/// Spreadsheet column letters for a 0-based index (`0` → `A`, `26` → `AA`)
pub fn column_letter(index: u32) -> String {
    let mut n = index as u64 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Parse an `A1` reference into 0-based `(row, column)`
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }

    let mut column: u32 = 0;
    for c in letters.trim_start_matches('$').chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        column = column
            .checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row: u32 = digits.trim_start_matches('$').parse().ok()?;
    if column == 0 || row == 0 {
        return None;
    }
    Some((row - 1, column - 1))
}
