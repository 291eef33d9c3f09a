//! Worksheet part (`xl/worksheets/sheetN.xml`) reading and rewriting
//!
//! Rewriting streams the original XML and copies every event verbatim except
//! the cells whose value changed and the `<cols>` element. A changed cell keeps
//! its `r` and `s` attributes; only its value children are replaced.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::shared_strings::{
    prefix_of, qualified, read_string_item, read_text, write_text_element, SharedStrings,
    SharedStringsBuilder,
};
use super::workbook::XlsxError;
use super::{parse_cell_ref, Cell, CellEncoding, CellStyle, CellValue, ColumnRange, Sheet, SheetRow};

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxError> {
    for a in e.attributes().with_checks(false) {
        let a = a?;
        if a.key.as_ref() == key {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Parse a worksheet into a [`Sheet`]
pub(crate) fn parse_worksheet(
    name: &str,
    part: &str,
    xml: &[u8],
    shared: &SharedStrings,
) -> Result<Sheet, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut sheet = Sheet::new(name);
    sheet.part = part.to_string();

    let mut in_sheet_data = false;
    let mut next_row: u32 = 0;
    let mut next_col: u32 = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"cols" => {
                sheet.column_ranges = parse_cols(&mut reader)?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => in_sheet_data = true,
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => in_sheet_data = false,
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let index = row_index(&e, next_row)?;
                sheet.rows.push(SheetRow {
                    index,
                    cells: Vec::new(),
                });
                next_row = index + 1;
                next_col = 0;
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let index = row_index(&e, next_row)?;
                sheet.rows.push(SheetRow {
                    index,
                    cells: Vec::new(),
                });
                next_row = index + 1;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let cell = parse_cell(&mut reader, &e, true, next_col, shared)?;
                next_col = cell.column + 1;
                push_cell(&mut sheet, cell)?;
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let cell = parse_cell(&mut reader, &e, false, next_col, shared)?;
                next_col = cell.column + 1;
                push_cell(&mut sheet, cell)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sheet)
}

fn push_cell(sheet: &mut Sheet, cell: Cell) -> Result<(), XlsxError> {
    match sheet.rows.last_mut() {
        Some(row) => {
            row.cells.push(cell);
            Ok(())
        }
        None => Err(XlsxError::Malformed("cell outside of a row")),
    }
}

fn row_index(e: &BytesStart<'_>, next: u32) -> Result<u32, XlsxError> {
    match attr(e, b"r")? {
        Some(r) => r
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|r| *r > 0)
            .map(|r| r - 1)
            .ok_or(XlsxError::Malformed("invalid row number")),
        None => Ok(next),
    }
}

fn parse_cols(reader: &mut Reader<&[u8]>) -> Result<Vec<ColumnRange>, XlsxError> {
    let mut ranges = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) if e.local_name().as_ref() == b"col" => ranges.push(parse_col(&e)?),
            Event::Start(e) if e.local_name().as_ref() == b"col" => {
                ranges.push(parse_col(&e)?);
                reader.read_to_end(e.name())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"cols" => break,
            Event::Eof => return Err(XlsxError::Malformed("unexpected eof in <cols>")),
            _ => {}
        }
    }
    Ok(ranges)
}

fn parse_col(e: &BytesStart<'_>) -> Result<ColumnRange, XlsxError> {
    let mut min = None;
    let mut max = None;
    let mut attributes = Vec::new();

    for a in e.attributes().with_checks(false) {
        let a = a?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let value = a.unescape_value()?.into_owned();
        match key.as_str() {
            "min" => min = value.trim().parse::<u32>().ok(),
            "max" => max = value.trim().parse::<u32>().ok(),
            _ => attributes.push((key, value)),
        }
    }

    match (min, max) {
        (Some(min), Some(max)) if min >= 1 && min <= max => Ok(ColumnRange {
            min,
            max,
            attributes,
        }),
        _ => Err(XlsxError::Malformed("invalid <col> range")),
    }
}

fn parse_cell(
    reader: &mut Reader<&[u8]>,
    e: &BytesStart<'_>,
    has_children: bool,
    next_col: u32,
    shared: &SharedStrings,
) -> Result<Cell, XlsxError> {
    let column = match attr(e, b"r")? {
        Some(r) => parse_cell_ref(&r)
            .map(|(_, col)| col)
            .ok_or(XlsxError::Malformed("invalid cell reference"))?,
        None => next_col,
    };
    let style = CellStyle(attr(e, b"s")?.and_then(|s| s.trim().parse().ok()));
    let cell_type = attr(e, b"t")?.unwrap_or_else(|| "n".to_string());

    let mut raw_value: Option<String> = None;
    let mut formula: Option<String> = None;
    let mut inline: Option<String> = None;

    if has_children {
        loop {
            match reader.read_event()? {
                Event::Start(c) if c.local_name().as_ref() == b"v" => {
                    raw_value = Some(read_text(reader, c.name())?);
                }
                Event::Start(c) if c.local_name().as_ref() == b"f" => {
                    formula = Some(read_text(reader, c.name())?);
                }
                Event::Empty(c) if c.local_name().as_ref() == b"f" => {
                    formula = Some(String::new());
                }
                Event::Start(c) if c.local_name().as_ref() == b"is" => {
                    inline = Some(read_string_item(reader, c.name())?);
                }
                Event::Start(c) => {
                    reader.read_to_end(c.name())?;
                }
                Event::End(c) if c.local_name().as_ref() == b"c" => break,
                Event::Eof => return Err(XlsxError::Malformed("unexpected eof in <c>")),
                _ => {}
            }
        }
    }

    let (value, encoding) = if let Some(f) = formula {
        (CellValue::Formula(f), CellEncoding::Plain)
    } else {
        match cell_type.as_str() {
            "s" => match raw_value {
                Some(v) => {
                    let index: usize = v
                        .trim()
                        .parse()
                        .map_err(|_| XlsxError::Malformed("invalid shared string index"))?;
                    let text = shared
                        .get(index)
                        .ok_or(XlsxError::Malformed("shared string index out of range"))?;
                    (CellValue::String(text.to_string()), CellEncoding::Shared)
                }
                None => (CellValue::Empty, CellEncoding::Plain),
            },
            "inlineStr" => match inline {
                Some(text) => (CellValue::String(text), CellEncoding::Inline),
                None => (CellValue::Empty, CellEncoding::Plain),
            },
            "str" => match raw_value {
                Some(text) => (CellValue::String(text), CellEncoding::Str),
                None => (CellValue::Empty, CellEncoding::Plain),
            },
            "b" => match raw_value {
                Some(v) => (CellValue::Bool(v.trim() == "1"), CellEncoding::Plain),
                None => (CellValue::Empty, CellEncoding::Plain),
            },
            "n" => match raw_value {
                Some(v) => match v.trim().parse::<f64>() {
                    Ok(n) => (CellValue::Number(n), CellEncoding::Plain),
                    Err(_) => (CellValue::Other(v), CellEncoding::Plain),
                },
                None => (CellValue::Empty, CellEncoding::Plain),
            },
            _ => match raw_value {
                Some(v) => (CellValue::Other(v), CellEncoding::Plain),
                None => (CellValue::Empty, CellEncoding::Plain),
            },
        }
    };

    Ok(Cell {
        column,
        original: value.clone(),
        value,
        style,
        encoding,
    })
}

/// Rewrite the worksheet XML for `sheet`, registering shared strings with
/// `strings`.
pub(crate) fn rewrite_worksheet(
    sheet: &Sheet,
    xml: &[u8],
    strings: &mut SharedStringsBuilder,
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    let mut cells = sheet.rows.iter().flat_map(|r| r.cells.iter());

    let mut in_sheet_data = false;
    let mut cols_written = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"cols" => {
                reader.read_to_end(e.name())?;
                write_cols(&mut writer, sheet, prefix_of(&e).as_deref())?;
                cols_written = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"cols" => {
                write_cols(&mut writer, sheet, prefix_of(&e).as_deref())?;
                cols_written = true;
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                if !cols_written {
                    write_cols(&mut writer, sheet, prefix_of(&e).as_deref())?;
                    cols_written = true;
                }
                in_sheet_data = true;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                if !cols_written {
                    write_cols(&mut writer, sheet, prefix_of(&e).as_deref())?;
                    cols_written = true;
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                in_sheet_data = false;
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let cell = cells
                    .next()
                    .ok_or(XlsxError::Malformed("worksheet has more cells than the model"))?;
                if cell.is_modified() {
                    reader.read_to_end(e.name())?;
                    write_cell(&mut writer, &e, cell, strings)?;
                } else {
                    if cell.encoding == CellEncoding::Shared {
                        strings.reference();
                    }
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let cell = cells
                    .next()
                    .ok_or(XlsxError::Malformed("worksheet has more cells than the model"))?;
                if cell.is_modified() {
                    write_cell(&mut writer, &e, cell, strings)?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev)?,
        }
    }

    if cells.next().is_some() {
        return Err(XlsxError::Malformed("model has more cells than the worksheet"));
    }

    Ok(writer.into_inner())
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    original: &BytesStart<'_>,
    cell: &Cell,
    strings: &mut SharedStringsBuilder,
) -> Result<(), XlsxError> {
    let prefix = prefix_of(original);
    let text = match &cell.value {
        CellValue::String(text) => text,
        _ => return Err(XlsxError::Malformed("only string cells can be rewritten")),
    };

    let encoding = match cell.encoding {
        CellEncoding::Plain => CellEncoding::Inline,
        other => other,
    };
    let cell_type = match encoding {
        CellEncoding::Shared => "s",
        CellEncoding::Str => "str",
        _ => "inlineStr",
    };

    let name = String::from_utf8_lossy(original.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name.clone());
    for a in original.attributes().with_checks(false) {
        let a = a?;
        if a.key.as_ref() != b"t" {
            start.push_attribute(a);
        }
    }
    start.push_attribute(("t", cell_type));
    writer.write_event(Event::Start(start))?;

    let v = qualified(prefix.as_deref(), "v");
    match encoding {
        CellEncoding::Shared => {
            strings.reference();
            let index = strings.intern(text).to_string();
            writer.write_event(Event::Start(BytesStart::new(v.clone())))?;
            writer.write_event(Event::Text(BytesText::new(&index)))?;
            writer.write_event(Event::End(BytesEnd::new(v)))?;
        }
        CellEncoding::Str => {
            writer.write_event(Event::Start(BytesStart::new(v.clone())))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new(v)))?;
        }
        _ => {
            let is = qualified(prefix.as_deref(), "is");
            writer.write_event(Event::Start(BytesStart::new(is.clone())))?;
            write_text_element(writer, prefix.as_deref(), text)?;
            writer.write_event(Event::End(BytesEnd::new(is)))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// One `<col>` element to emit
struct ColumnSpan<'a> {
    min: u32,
    max: u32,
    width: Option<f64>,
    attributes: &'a [(String, String)],
}

/// Merge the original column ranges with the reflowed widths. Ranges are
/// split where a column inside them received a new width.
fn column_spans(sheet: &Sheet) -> Vec<ColumnSpan<'_>> {
    let mut spans = Vec::new();

    for range in &sheet.column_ranges {
        let mut cursor = range.min;
        for (&col, &width) in sheet.widths.range(range.min - 1..range.max) {
            let one_based = col + 1;
            if cursor < one_based {
                spans.push(ColumnSpan {
                    min: cursor,
                    max: one_based - 1,
                    width: None,
                    attributes: &range.attributes,
                });
            }
            spans.push(ColumnSpan {
                min: one_based,
                max: one_based,
                width: Some(width),
                attributes: &range.attributes,
            });
            cursor = one_based + 1;
        }
        if cursor <= range.max {
            spans.push(ColumnSpan {
                min: cursor,
                max: range.max,
                width: None,
                attributes: &range.attributes,
            });
        }
    }

    for (&col, &width) in &sheet.widths {
        let one_based = col + 1;
        let covered = sheet
            .column_ranges
            .iter()
            .any(|r| r.min <= one_based && one_based <= r.max);
        if !covered {
            spans.push(ColumnSpan {
                min: one_based,
                max: one_based,
                width: Some(width),
                attributes: &[],
            });
        }
    }

    spans.sort_by_key(|s| s.min);
    spans
}

fn write_cols(
    writer: &mut Writer<Vec<u8>>,
    sheet: &Sheet,
    prefix: Option<&str>,
) -> Result<(), XlsxError> {
    let spans = column_spans(sheet);
    if spans.is_empty() {
        return Ok(());
    }

    let cols = qualified(prefix, "cols");
    let col = qualified(prefix, "col");
    writer.write_event(Event::Start(BytesStart::new(cols.clone())))?;

    for span in spans {
        let mut element = BytesStart::new(col.clone());
        element.push_attribute(("min", span.min.to_string().as_str()));
        element.push_attribute(("max", span.max.to_string().as_str()));
        match span.width {
            Some(width) => {
                for (key, value) in span.attributes {
                    if key != "width" && key != "customWidth" {
                        element.push_attribute((key.as_str(), value.as_str()));
                    }
                }
                element.push_attribute(("width", width.to_string().as_str()));
                element.push_attribute(("customWidth", "1"));
            }
            None => {
                for (key, value) in span.attributes {
                    element.push_attribute((key.as_str(), value.as_str()));
                }
            }
        }
        writer.write_event(Event::Empty(element))?;
    }

    writer.write_event(Event::End(BytesEnd::new(cols)))?;
    Ok(())
}
