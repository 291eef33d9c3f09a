//! Shared strings table (`xl/sharedStrings.xml`)

use std::collections::{BTreeSet, HashMap};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use super::workbook::XlsxError;

/// Plain text of every `<si>` item, in index order
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SharedStrings {
    pub part: Option<String>,
    pub items: Vec<String>,
    /// Items carrying runs or phonetic text; their index is never handed
    /// out for new text
    pub rich: BTreeSet<usize>,
}

impl SharedStrings {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }
}

pub(crate) fn parse_shared_strings(xml: &[u8]) -> Result<SharedStrings, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut strings = SharedStrings::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => {
                let (text, plain) = read_item(&mut reader, e.name())?;
                if !plain {
                    strings.rich.insert(strings.items.len());
                }
                strings.items.push(text);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.items.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

/// Visible text of an `<si>` or `<is>` element: direct `<t>` children and
/// `<r><t>` runs. Phonetic `<rPh>` runs are not part of the displayed text.
pub(crate) fn read_string_item(
    reader: &mut Reader<&[u8]>,
    end: QName<'_>,
) -> Result<String, XlsxError> {
    read_item(reader, end).map(|(text, _)| text)
}

/// Text of a string item and whether it was nothing but `<t>` children
fn read_item(reader: &mut Reader<&[u8]>, end: QName<'_>) -> Result<(String, bool), XlsxError> {
    let mut text = String::new();
    let mut plain = true;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                text.push_str(&read_text(reader, e.name())?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"t" => {}
            Event::Start(e) if e.local_name().as_ref() == b"r" => plain = false,
            Event::End(e) if e.local_name().as_ref() == b"r" => {}
            Event::Start(e) => {
                plain = false;
                reader.read_to_end(e.name())?;
            }
            Event::Empty(_) => plain = false,
            Event::End(e) if e.name() == end => break,
            Event::Eof => return Err(XlsxError::Malformed("unexpected eof in string item")),
            _ => {}
        }
    }

    Ok((text, plain))
}

pub(crate) fn read_text(reader: &mut Reader<&[u8]>, end: QName<'_>) -> Result<String, XlsxError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::End(e) if e.name() == end => break,
            Event::Eof => return Err(XlsxError::Malformed("unexpected eof in text")),
            _ => {}
        }
    }
    Ok(text)
}

/// Collects strings for the rewritten table. Existing items keep their index;
/// new text is appended once.
#[derive(Debug)]
pub(crate) struct SharedStringsBuilder {
    base_len: usize,
    lookup: HashMap<String, u32>,
    appended: Vec<String>,
    references: usize,
}

impl SharedStringsBuilder {
    pub fn new(base: &SharedStrings) -> Self {
        let mut lookup = HashMap::new();
        for (i, text) in base.items.iter().enumerate() {
            if base.rich.contains(&i) {
                continue;
            }
            lookup.entry(text.clone()).or_insert(i as u32);
        }
        Self {
            base_len: base.items.len(),
            lookup,
            appended: Vec::new(),
            references: 0,
        }
    }

    /// Index of `text`, appending it when it is not in the table yet
    pub fn intern(&mut self, text: &str) -> u32 {
        if let Some(index) = self.lookup.get(text) {
            return *index;
        }
        let index = (self.base_len + self.appended.len()) as u32;
        self.appended.push(text.to_string());
        self.lookup.insert(text.to_string(), index);
        index
    }

    /// Count one `t="s"` cell
    pub fn reference(&mut self) {
        self.references += 1;
    }

    pub fn has_new_items(&self) -> bool {
        !self.appended.is_empty()
    }

    /// Rewrite the table: original items are copied verbatim, new items are
    /// appended before `</sst>`, `count`/`uniqueCount` are refreshed.
    pub fn rewrite(&self, xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
        let mut reader = Reader::from_reader(xml);
        let mut writer = Writer::new(Vec::with_capacity(xml.len() + self.appended.len() * 64));
        let unique = self.base_len + self.appended.len();

        loop {
            match reader.read_event()? {
                Event::Start(e) if e.local_name().as_ref() == b"sst" => {
                    writer.write_event(Event::Start(self.sst_start(&e, unique)?))?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sst" => {
                    let prefix = prefix_of(&e);
                    writer.write_event(Event::Start(self.sst_start(&e, unique)?))?;
                    self.write_appended(&mut writer, prefix.as_deref())?;
                    writer.write_event(Event::End(BytesEnd::new(qualified(
                        prefix.as_deref(),
                        "sst",
                    ))))?;
                }
                Event::End(e) if e.local_name().as_ref() == b"sst" => {
                    let prefix = e.name().prefix().map(|p| {
                        String::from_utf8_lossy(p.as_ref()).into_owned()
                    });
                    self.write_appended(&mut writer, prefix.as_deref())?;
                    writer.write_event(Event::End(e))?;
                }
                Event::Eof => break,
                ev => writer.write_event(ev)?,
            }
        }

        Ok(writer.into_inner())
    }

    fn sst_start(&self, e: &BytesStart<'_>, unique: usize) -> Result<BytesStart<'static>, XlsxError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut start = BytesStart::new(name);
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            match attr.key.as_ref() {
                b"count" | b"uniqueCount" => {}
                _ => start.push_attribute(attr),
            }
        }
        start.push_attribute(("count", self.references.to_string().as_str()));
        start.push_attribute(("uniqueCount", unique.to_string().as_str()));
        Ok(start)
    }

    fn write_appended(
        &self,
        writer: &mut Writer<Vec<u8>>,
        prefix: Option<&str>,
    ) -> Result<(), XlsxError> {
        for text in &self.appended {
            writer.write_event(Event::Start(BytesStart::new(qualified(prefix, "si"))))?;
            write_text_element(writer, prefix, text)?;
            writer.write_event(Event::End(BytesEnd::new(qualified(prefix, "si"))))?;
        }
        Ok(())
    }
}

/// Write `<t xml:space="preserve">text</t>`
pub(crate) fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    prefix: Option<&str>,
    text: &str,
) -> Result<(), XlsxError> {
    let mut t = BytesStart::new(qualified(prefix, "t"));
    t.push_attribute(("xml:space", "preserve"));
    writer.write_event(Event::Start(t))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(qualified(prefix, "t"))))?;
    Ok(())
}

pub(crate) fn prefix_of(e: &BytesStart<'_>) -> Option<String> {
    e.name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

pub(crate) fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>销售额</t></si><si><r><rPr><b/></rPr><t>Q1</t></r><r><t xml:space="preserve"> 合计</t></r><rPh sb="0" eb="1"><t>ゴウ</t></rPh></si><si><t>A &amp; B</t></si></sst>"#;

    #[test]
    fn test_parse_plain_and_rich_items() {
        let strings = parse_shared_strings(SST.as_bytes()).unwrap();
        assert_eq!(strings.items, vec!["销售额", "Q1 合计", "A & B"]);
        assert_eq!(strings.rich.iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_intern_reuses_and_appends() {
        let base = SharedStrings {
            items: vec!["销售额".to_string(), "Sales".to_string()],
            ..Default::default()
        };
        let mut builder = SharedStringsBuilder::new(&base);
        assert_eq!(builder.intern("Sales"), 1);
        assert_eq!(builder.intern("Revenue"), 2);
        assert_eq!(builder.intern("Revenue"), 2);
        assert!(builder.has_new_items());
    }

    #[test]
    fn test_intern_skips_rich_items() {
        let base = parse_shared_strings(SST.as_bytes()).unwrap();
        let mut builder = SharedStringsBuilder::new(&base);

        // Same visible text as the bold rich item, but must not borrow its runs
        assert_eq!(builder.intern("Q1 合计"), 3);
        assert_eq!(builder.intern("销售额"), 0);
        assert_eq!(builder.intern("A & B"), 2);
    }

    #[test]
    fn test_rewrite_appends_items_and_counts() {
        let base = parse_shared_strings(SST.as_bytes()).unwrap();
        let mut builder = SharedStringsBuilder::new(&base);
        builder.intern("Sales <total>");
        for _ in 0..4 {
            builder.reference();
        }

        let out = builder.rewrite(SST.as_bytes()).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains(r#"count="4""#));
        assert!(out.contains(r#"uniqueCount="4""#));
        // Rich run of the untouched item survives verbatim
        assert!(out.contains("<r><rPr><b/></rPr><t>Q1</t></r>"));
        assert!(out.contains(r#"<si><t xml:space="preserve">Sales &lt;total&gt;</t></si></sst>"#));

        let items = parse_shared_strings(out.as_bytes()).unwrap().items;
        assert_eq!(items.len(), 4);
        assert_eq!(items[3], "Sales <total>");
    }

    #[test]
    fn test_rewrite_empty_table() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"/>"#;
        let mut builder = SharedStringsBuilder::new(&SharedStrings::default());
        builder.intern("Hello");
        builder.reference();

        let out = String::from_utf8(builder.rewrite(xml.as_bytes()).unwrap()).unwrap();
        assert_eq!(parse_shared_strings(out.as_bytes()).unwrap().items, vec!["Hello"]);
        assert!(out.ends_with("</sst>"));
    }
}
