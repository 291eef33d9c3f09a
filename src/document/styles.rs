//! Number formats from `xl/styles.xml`, read only far enough to tell which
//! cell formats show a number as a date or time

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::workbook::XlsxError;

/// Largest serial Excel accepts (9999-12-31)
const MAX_SERIAL: f64 = 2_958_465.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Cell format indices (`s` attribute) that render numbers as dates or times
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DateFormats {
    styles: BTreeSet<u32>,
    date1904: bool,
}

impl DateFormats {
    pub fn new(styles: impl IntoIterator<Item = u32>, date1904: bool) -> Self {
        Self {
            styles: styles.into_iter().collect(),
            date1904,
        }
    }

    pub fn is_date(&self, style: u32) -> bool {
        self.styles.contains(&style)
    }

    /// Date/time text for `serial` when `style` is a date format
    pub fn render(&self, serial: f64, style: Option<u32>) -> Option<String> {
        match style {
            Some(style) if self.is_date(style) => render_serial(serial, self.date1904),
            _ => None,
        }
    }
}

/// Parse `<numFmts>` and `<cellXfs>` and keep the xf indices whose number
/// format is a date or time.
pub(crate) fn parse_date_formats(xml: &[u8], date1904: bool) -> Result<DateFormats, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut custom: HashMap<u32, String> = HashMap::new();
    let mut xf_formats: Vec<u32> = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"numFmt" => {
                let id = attr(&e, b"numFmtId")?.and_then(|v| v.parse().ok());
                let code = attr(&e, b"formatCode")?;
                if let (Some(id), Some(code)) = (id, code) {
                    custom.insert(id, code);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Start(e) | Event::Empty(e)
                if in_cell_xfs && e.local_name().as_ref() == b"xf" =>
            {
                let id = attr(&e, b"numFmtId")?
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                xf_formats.push(id);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let styles = xf_formats
        .into_iter()
        .enumerate()
        .filter(|&(_, id)| match custom.get(&id) {
            Some(code) => looks_like_datetime(code),
            None => is_builtin_date_format(id),
        })
        .map(|(index, _)| index as u32);

    Ok(DateFormats::new(styles, date1904))
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxError> {
    for a in e.attributes().with_checks(false) {
        let a = a?;
        if a.key.local_name().as_ref() == key {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Built-in date/time ids: 14-22 and 45-47, plus the locale-specific ranges
fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// Whether a format code shows dates or times. Quoted literals, escapes and
/// colour/locale brackets are skipped; `m` alone is ambiguous and counts only
/// next to another date/time token.
pub(crate) fn looks_like_datetime(code: &str) -> bool {
    // Only the first section formats positive numbers
    let section = code.split(';').next().unwrap_or(code);
    let mut in_quotes = false;
    let mut prev: Option<char> = None;
    let mut chars = section.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                in_quotes = false;
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut content = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    content.push(c);
                }
                let lower = content.to_ascii_lowercase();
                if matches!(lower.as_str(), "h" | "hh" | "m" | "mm" | "s" | "ss") {
                    return true;
                }
            }
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => return true,
            'm' | 'M' => {
                let near_date = |c: Option<char>| {
                    matches!(c, Some('y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' | ':' | '/' | '-'))
                };
                if near_date(prev) || near_date(chars.peek().copied()) {
                    return true;
                }
            }
            _ => {}
        }
        prev = Some(ch);
    }

    false
}

/// Render a serial the way a date-aware reader shows it: `YYYY-MM-DD
/// HH:MM:SS`, or `HH:MM:SS` for a time of day below one.
pub(crate) fn render_serial(serial: f64, date1904: bool) -> Option<String> {
    if !(0.0..=MAX_SERIAL).contains(&serial) {
        return None;
    }

    let mut days = serial.trunc() as i64;
    let mut seconds = ((serial - serial.trunc()) * SECONDS_PER_DAY).round() as i64;
    if seconds >= SECONDS_PER_DAY as i64 {
        days += 1;
        seconds -= SECONDS_PER_DAY as i64;
    }

    let time = NaiveDate::from_ymd_opt(1900, 1, 1)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::seconds(seconds))?
        .time();

    if days == 0 && !date1904 {
        return Some(time.format("%H:%M:%S").to_string());
    }

    // 1900 system: serial 1 is 1900-01-01 and serial 60 is the phantom
    // 1900-02-29, so the epoch moves one day for earlier serials.
    let epoch = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else if days < 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };

    let date = epoch.checked_add_signed(Duration::days(days))?;
    Some(NaiveDateTime::new(date, time).format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="3"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/><numFmt numFmtId="165" formatCode="0.00&quot; m&quot;"/><numFmt numFmtId="166" formatCode="[$-409]h:mm AM/PM"/></numFmts><cellStyleXfs count="1"><xf numFmtId="14"/></cellStyleXfs><cellXfs count="6"><xf numFmtId="0" fontId="0"/><xf numFmtId="164" fontId="0" applyNumberFormat="1"/><xf numFmtId="165"/><xf numFmtId="14"/><xf numFmtId="4"/><xf numFmtId="166"><alignment horizontal="left"/></xf></cellXfs></styleSheet>"#;

    #[test]
    fn test_parse_date_formats() {
        let formats = parse_date_formats(STYLES.as_bytes(), false).unwrap();

        let dates: Vec<u32> = (0..6).filter(|s| formats.is_date(*s)).collect();
        assert_eq!(dates, vec![1, 3, 5]);
    }

    #[test]
    fn test_format_code_heuristic() {
        assert!(looks_like_datetime("yyyy-mm-dd"));
        assert!(looks_like_datetime("[h]:mm:ss"));
        assert!(looks_like_datetime("mm:ss"));
        assert!(looks_like_datetime("[Red]d/m/yy"));
        assert!(!looks_like_datetime("0.00"));
        assert!(!looks_like_datetime("#,##0\" m\""));
        assert!(!looks_like_datetime("[Red]0.0;[Blue]-0.0"));
        assert!(!looks_like_datetime("General"));
    }

    #[test]
    fn test_render_serial() {
        assert_eq!(render_serial(45306.0, false).as_deref(), Some("2024-01-15 00:00:00"));
        assert_eq!(render_serial(45306.5, false).as_deref(), Some("2024-01-15 12:00:00"));
        assert_eq!(render_serial(1.0, false).as_deref(), Some("1900-01-01 00:00:00"));
        assert_eq!(render_serial(61.0, false).as_deref(), Some("1900-03-01 00:00:00"));
        assert_eq!(render_serial(0.75, false).as_deref(), Some("18:00:00"));
        assert_eq!(render_serial(0.0, true).as_deref(), Some("1904-01-01 00:00:00"));
        assert_eq!(render_serial(-1.0, false), None);
        assert_eq!(render_serial(f64::NAN, false), None);
    }

    #[test]
    fn test_render_only_for_date_styles() {
        let formats = DateFormats::new([2], false);
        assert_eq!(formats.render(45306.0, Some(2)).as_deref(), Some("2024-01-15 00:00:00"));
        assert_eq!(formats.render(45306.0, Some(1)), None);
        assert_eq!(formats.render(45306.0, None), None);
    }
}
