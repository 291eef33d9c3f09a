//! Spreadsheet workbooks (`.xlsx`)
//!
//! The package is kept as its ordered list of ZIP parts. Reading parses the
//! worksheets and shared strings into [`Sheet`]s; writing regenerates only
//! the worksheets that changed and the shared strings table, every other
//! part (styles, themes, drawings, defined names) is copied unchanged.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::shared_strings::{parse_shared_strings, SharedStrings, SharedStringsBuilder};
use super::styles::{parse_date_formats, DateFormats};
use super::worksheet::{parse_worksheet, rewrite_worksheet};
use super::{CellEncoding, Sheet};

/// Largest single part accepted when reading a package
pub const MAX_PART_SIZE: u64 = 256 * 1024 * 1024;

const REL_TYPE_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_TYPE_WORKSHEET: &str = "/worksheet";
const REL_TYPE_SHARED_STRINGS: &str = "/sharedStrings";
const REL_TYPE_STYLES: &str = "/styles";
const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed workbook: {0}")]
    Malformed(&'static str),
    #[error("missing part: {0}")]
    MissingPart(String),
    #[error("part {name} is {size} bytes, limit is {limit}")]
    PartTooLarge { name: String, size: u64, limit: u64 },
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// Ordered ZIP parts of an OOXML package
#[derive(Debug, Clone, Default)]
pub(crate) struct Package {
    parts: Vec<Part>,
}

impl Package {
    pub fn read(bytes: &[u8]) -> Result<Self, XlsxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            let name = file.name().to_string();

            if file.is_dir() {
                parts.push(Part {
                    name,
                    data: Vec::new(),
                    is_dir: true,
                });
                continue;
            }

            if file.size() > MAX_PART_SIZE {
                return Err(XlsxError::PartTooLarge {
                    name,
                    size: file.size(),
                    limit: MAX_PART_SIZE,
                });
            }

            let mut data = Vec::with_capacity(file.size() as usize);
            // Declared sizes can lie; bound the actual read too
            file.take(MAX_PART_SIZE + 1).read_to_end(&mut data)?;
            if data.len() as u64 > MAX_PART_SIZE {
                return Err(XlsxError::PartTooLarge {
                    name,
                    size: data.len() as u64,
                    limit: MAX_PART_SIZE,
                });
            }

            parts.push(Part {
                name,
                data,
                is_dir: false,
            });
        }

        Ok(Self { parts })
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| !p.is_dir && p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// Write every part in its original order, substituting `replacements`
    pub fn write(&self, replacements: &HashMap<String, Vec<u8>>) -> Result<Vec<u8>, XlsxError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for part in &self.parts {
            if part.is_dir {
                zip.add_directory(part.name.clone(), options)?;
                continue;
            }
            zip.start_file(part.name.clone(), options)?;
            match replacements.get(&part.name) {
                Some(data) => zip.write_all(data)?,
                None => zip.write_all(&part.data)?,
            }
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

/// A `<Relationship>` entry with its target resolved to a part name
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
}

/// Location of the `.rels` part describing `part`
pub(crate) fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{}/_rels/{}.rels", dir, file_name),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target relative to the part that declares it
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute);
    }
    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{}/{}", base_dir, target))
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

/// Parse a `.rels` part; external targets are dropped
pub(crate) fn parse_relationships(
    source_part: &str,
    xml: &[u8],
) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut relationships = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut type_uri = None;
                let mut target = None;
                let mut external = false;
                for attr in e.attributes().with_checks(false) {
                    let attr = attr?;
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value),
                        b"Type" => type_uri = Some(value),
                        b"Target" => target = Some(value),
                        b"TargetMode" => external = value.eq_ignore_ascii_case("External"),
                        _ => {}
                    }
                }
                if external {
                    continue;
                }
                if let (Some(id), Some(type_uri), Some(target)) = (id, type_uri, target) {
                    relationships.push(Relationship {
                        id,
                        type_uri,
                        target: resolve_target(source_part, &target),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(relationships)
}

/// `(name, relationship id)` of every `<sheet>` in workbook order
fn parse_sheet_entries(xml: &[u8]) -> Result<Vec<(String, String)>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut entries = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes().with_checks(false) {
                    let attr = attr?;
                    let key = attr.key;
                    if key.as_ref() == b"name" {
                        name = Some(attr.unescape_value()?.into_owned());
                    } else if key.prefix().is_some() && key.local_name().as_ref() == b"id" {
                        rel_id = Some(attr.unescape_value()?.into_owned());
                    }
                }
                match (name, rel_id) {
                    (Some(name), Some(rel_id)) => entries.push((name, rel_id)),
                    _ => return Err(XlsxError::Malformed("<sheet> without name or r:id")),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

/// Whether `<workbookPr date1904="1"/>` switches serials to the 1904 epoch
fn parse_date1904(xml: &[u8]) -> Result<bool, XlsxError> {
    let mut reader = Reader::from_reader(xml);

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"workbookPr" => {
                for attr in e.attributes().with_checks(false) {
                    let attr = attr?;
                    if attr.key.as_ref() == b"date1904" {
                        let value = attr.unescape_value()?;
                        return Ok(matches!(value.as_ref(), "1" | "true"));
                    }
                }
                return Ok(false);
            }
            Event::Start(e) if e.local_name().as_ref() == b"sheets" => return Ok(false),
            Event::Eof => return Ok(false),
            _ => {}
        }
    }
}

/// A multi-sheet spreadsheet
#[derive(Debug, Clone)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
    pub(crate) package: Package,
    pub(crate) shared_strings: SharedStrings,
}

impl Workbook {
    /// Read a workbook from `.xlsx` bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        let package = Package::read(bytes)?;

        let workbook_part = match package.get("_rels/.rels") {
            Some(xml) => parse_relationships("", xml)?
                .into_iter()
                .find(|r| r.type_uri.ends_with(REL_TYPE_OFFICE_DOCUMENT))
                .map(|r| r.target)
                .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string()),
            None => DEFAULT_WORKBOOK_PART.to_string(),
        };

        let workbook_xml = package
            .get(&workbook_part)
            .ok_or_else(|| XlsxError::MissingPart(workbook_part.clone()))?;

        let rels_part = rels_for_part(&workbook_part);
        let relationships = match package.get(&rels_part) {
            Some(xml) => parse_relationships(&workbook_part, xml)?,
            None => return Err(XlsxError::MissingPart(rels_part)),
        };
        let by_id: HashMap<&str, &Relationship> =
            relationships.iter().map(|r| (r.id.as_str(), r)).collect();

        let shared_strings = match relationships
            .iter()
            .find(|r| r.type_uri.ends_with(REL_TYPE_SHARED_STRINGS))
        {
            Some(rel) => match package.get(&rel.target) {
                Some(xml) => SharedStrings {
                    part: Some(rel.target.clone()),
                    ..parse_shared_strings(xml)?
                },
                None => return Err(XlsxError::MissingPart(rel.target.clone())),
            },
            None => SharedStrings::default(),
        };

        let date1904 = parse_date1904(workbook_xml)?;
        let dates = match relationships
            .iter()
            .find(|r| r.type_uri.ends_with(REL_TYPE_STYLES))
            .and_then(|rel| package.get(&rel.target))
        {
            Some(xml) => parse_date_formats(xml, date1904)?,
            None => DateFormats::new(std::iter::empty(), date1904),
        };
        let dates = Arc::new(dates);

        let mut sheets = Vec::new();
        for (name, rel_id) in parse_sheet_entries(workbook_xml)? {
            let rel = by_id
                .get(rel_id.as_str())
                .ok_or(XlsxError::Malformed("sheet relationship not found"))?;
            if !rel.type_uri.ends_with(REL_TYPE_WORKSHEET) {
                debug!("Skipping non-worksheet sheet '{}' ({})", name, rel.type_uri);
                continue;
            }
            let xml = package
                .get(&rel.target)
                .ok_or_else(|| XlsxError::MissingPart(rel.target.clone()))?;
            let mut sheet = parse_worksheet(&name, &rel.target, xml, &shared_strings)?;
            sheet.dates = Arc::clone(&dates);
            sheets.push(sheet);
        }

        debug!(
            "Read workbook: {} sheets, {} shared strings",
            sheets.len(),
            shared_strings.items.len()
        );

        Ok(Self {
            sheets,
            package,
            shared_strings,
        })
    }

    /// In-memory workbook without a backing package
    #[cfg(test)]
    pub(crate) fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Self {
            sheets,
            package: Package::default(),
            shared_strings: SharedStrings::default(),
        }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Write the workbook back to `.xlsx` bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut strings = SharedStringsBuilder::new(&self.shared_strings);
        let mut replacements = HashMap::new();

        for sheet in &self.sheets {
            if sheet.is_dirty() {
                let xml = self
                    .package
                    .get(&sheet.part)
                    .ok_or_else(|| XlsxError::MissingPart(sheet.part.clone()))?;
                replacements.insert(sheet.part.clone(), rewrite_worksheet(sheet, xml, &mut strings)?);
            } else {
                for _ in sheet
                    .cells()
                    .filter(|(_, c)| c.encoding == CellEncoding::Shared)
                {
                    strings.reference();
                }
            }
        }

        if strings.has_new_items() {
            let part = self
                .shared_strings
                .part
                .as_ref()
                .ok_or(XlsxError::Malformed("shared string cell without a table"))?;
            let xml = self
                .package
                .get(part)
                .ok_or_else(|| XlsxError::MissingPart(part.clone()))?;
            replacements.insert(part.clone(), strings.rewrite(xml)?);
        }

        debug!("Writing workbook: {} parts rewritten", replacements.len());
        self.package.write(&replacements)
    }
}
