//! Import source readers.
//!
//! # Responsibility
//! - Read delimited text files into numbered rows.
//! - Read the first worksheet of an `.xlsx` workbook into numbered rows.
//!
//! # Invariants
//! - Text rows are numbered by 1-based physical line; blank lines are dropped
//!   but still counted.
//! - Worksheet rows keep their sheet row number; the header (row 1) is never
//!   returned.
//! - Any failure is a `SourceError`; partial rows are never returned.

use crate::import::report::RowLocation;
use crate::import::row::SourceRow;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

const WORKBOOK_ENTRY: &str = "xl/workbook.xml";
const WORKBOOK_RELS_ENTRY: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_ENTRY: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/sheet";

static ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<row\b([^>]*?)(?:/>|>(.*?)</row>)").expect("valid row regex")
});
static CELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").expect("valid cell regex")
});
static ROW_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\br="(\d+)""#).expect("valid row number regex"));
static CELL_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\br="([A-Z]+)(\d+)""#).expect("valid cell ref regex"));
static CELL_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bt="([^"]*)""#).expect("valid cell type regex"));
static VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<v\b[^>]*>(.*?)</v>").expect("valid value regex"));
static TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<t\b[^>]*>(.*?)</t>").expect("valid text regex"));
static SHARED_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<si\b[^>]*>(.*?)</si>").expect("valid shared item regex"));
static FIRST_SHEET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<sheet\b[^>]*?\br:id="([^"]+)""#).expect("valid sheet regex")
});
static RELATIONSHIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Relationship\b([^>]*)/?>").expect("valid relationship regex"));
static REL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bId="([^"]+)""#).expect("valid relationship id regex"));
static REL_TARGET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bTarget="([^"]+)""#).expect("valid relationship target regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(amp|lt|gt|quot|apos|#x[0-9A-Fa-f]+|#[0-9]+);").expect("valid entity regex")
});

/// Physical format of an import source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    DelimitedText,
    Spreadsheet,
}

impl SourceFormat {
    /// `.xlsx` (any case) is a spreadsheet; everything else is text.
    pub fn from_path(path: &Path) -> Self {
        let is_xlsx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
        if is_xlsx {
            Self::Spreadsheet
        } else {
            Self::DelimitedText
        }
    }
}

#[derive(Debug)]
pub enum SourceError {
    Io(std::io::Error),
    Encoding(std::string::FromUtf8Error),
    Archive(ZipError),
    /// The archive is readable but is not a usable workbook.
    Workbook(String),
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Encoding(err) => write!(f, "source is not valid UTF-8: {err}"),
            Self::Archive(err) => write!(f, "invalid workbook archive: {err}"),
            Self::Workbook(message) => write!(f, "invalid workbook: {message}"),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Encoding(err) => Some(err),
            Self::Archive(err) => Some(err),
            Self::Workbook(_) => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<std::string::FromUtf8Error> for SourceError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        Self::Encoding(value)
    }
}

impl From<ZipError> for SourceError {
    fn from(value: ZipError) -> Self {
        Self::Archive(value)
    }
}

/// Reads all rows from `path`, choosing the reader by extension.
pub fn read_source(path: &Path) -> Result<Vec<SourceRow>, SourceError> {
    match SourceFormat::from_path(path) {
        SourceFormat::DelimitedText => {
            let bytes = std::fs::read(path)?;
            Ok(parse_text(&String::from_utf8(bytes)?))
        }
        SourceFormat::Spreadsheet => parse_spreadsheet(File::open(path)?),
    }
}

/// Splits delimited text into rows. A leading BOM is ignored.
pub fn parse_text(content: &str) -> Vec<SourceRow> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| SourceRow::from_line(index + 1, line))
        .collect()
}

/// Reads the first worksheet of an xlsx workbook.
pub fn parse_spreadsheet<R: Read + Seek>(reader: R) -> Result<Vec<SourceRow>, SourceError> {
    let mut archive = ZipArchive::new(reader)?;
    let shared_strings = match read_entry(&mut archive, SHARED_STRINGS_ENTRY)? {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };
    let sheet_entry = first_sheet_entry(&mut archive)?;
    let sheet_xml = read_entry(&mut archive, &sheet_entry)?
        .ok_or_else(|| SourceError::Workbook(format!("missing worksheet `{sheet_entry}`")))?;
    parse_sheet_rows(&sheet_xml, &shared_strings)
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, SourceError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(Some(text))
}

/// Resolves the first `<sheet>` of the workbook through its relationship;
/// falls back to the lowest-numbered `sheetN.xml` entry.
fn first_sheet_entry<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, SourceError> {
    if let Some(entry) = sheet_entry_from_workbook(archive)? {
        if archive.file_names().any(|name| name == entry) {
            return Ok(entry);
        }
    }

    archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix(WORKSHEET_PREFIX)?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .min()
        .map(|(_, name)| name)
        .ok_or_else(|| SourceError::Workbook("workbook has no worksheets".to_string()))
}

fn sheet_entry_from_workbook<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Option<String>, SourceError> {
    let Some(workbook) = read_entry(archive, WORKBOOK_ENTRY)? else {
        return Ok(None);
    };
    let Some(rel_id) = FIRST_SHEET_RE
        .captures(&workbook)
        .map(|caps| caps[1].to_string())
    else {
        return Ok(None);
    };
    let Some(rels) = read_entry(archive, WORKBOOK_RELS_ENTRY)? else {
        return Ok(None);
    };

    let target = RELATIONSHIP_RE.captures_iter(&rels).find_map(|caps| {
        let attrs = caps.get(1)?.as_str();
        let id = REL_ID_RE.captures(attrs)?;
        if id[1] != rel_id {
            return None;
        }
        REL_TARGET_RE.captures(attrs).map(|target| target[1].to_string())
    });

    Ok(target.map(|target| match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }))
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    SHARED_ITEM_RE
        .captures_iter(xml)
        .map(|caps| concat_text_runs(caps.get(1).map_or("", |m| m.as_str())))
        .collect()
}

/// Joins every `<t>` run, so rich-text cells read as plain text.
fn concat_text_runs(xml: &str) -> String {
    TEXT_RE
        .captures_iter(xml)
        .map(|caps| unescape_xml(caps.get(1).map_or("", |m| m.as_str())))
        .collect()
}

fn parse_sheet_rows(xml: &str, shared_strings: &[String]) -> Result<Vec<SourceRow>, SourceError> {
    let mut rows = Vec::new();
    let mut implicit_number = 0usize;

    for row_caps in ROW_RE.captures_iter(xml) {
        let attrs = row_caps.get(1).map_or("", |m| m.as_str());
        let row_number = match ROW_NUMBER_RE.captures(attrs) {
            Some(caps) => caps[1]
                .parse::<usize>()
                .map_err(|_| SourceError::Workbook(format!("invalid row number `{}`", &caps[1])))?,
            None => implicit_number + 1,
        };
        implicit_number = row_number;
        if row_number <= 1 {
            continue;
        }

        let body = row_caps.get(2).map_or("", |m| m.as_str());
        let cells = parse_row_cells(body, shared_strings)?;
        let fields = leading_fields(&cells);
        if fields.is_empty() {
            continue;
        }
        rows.push(SourceRow::new(RowLocation::Row(row_number), fields));
    }
    Ok(rows)
}

fn parse_row_cells(
    row_xml: &str,
    shared_strings: &[String],
) -> Result<BTreeMap<usize, String>, SourceError> {
    let mut cells = BTreeMap::new();
    let mut next_column = 0usize;

    for cell_caps in CELL_RE.captures_iter(row_xml) {
        let attrs = cell_caps.get(1).map_or("", |m| m.as_str());
        let column = match CELL_REF_RE.captures(attrs) {
            Some(caps) => column_index(&caps[1]),
            None => next_column,
        };
        next_column = column + 1;

        let body = cell_caps.get(2).map_or("", |m| m.as_str());
        let cell_type = CELL_TYPE_RE.captures(attrs).map(|caps| caps[1].to_string());
        let value = match cell_type.as_deref() {
            Some("s") => {
                let raw = raw_value(body);
                let index = raw.trim().parse::<usize>().map_err(|_| {
                    SourceError::Workbook(format!("invalid shared string index `{raw}`"))
                })?;
                shared_strings.get(index).cloned().ok_or_else(|| {
                    SourceError::Workbook(format!("shared string index {index} out of range"))
                })?
            }
            Some("inlineStr") => concat_text_runs(body),
            _ => unescape_xml(&raw_value(body)),
        };
        cells.insert(column, value.trim().to_string());
    }
    Ok(cells)
}

fn raw_value(cell_xml: &str) -> String {
    VALUE_RE
        .captures(cell_xml)
        .and_then(|caps| caps.get(1))
        .map_or_else(String::new, |m| m.as_str().to_string())
}

/// Cells from column A up to the first missing or empty cell.
fn leading_fields(cells: &BTreeMap<usize, String>) -> Vec<String> {
    (0..)
        .map_while(|column| cells.get(&column).filter(|value| !value.is_empty()).cloned())
        .collect()
}

/// `A` → 0, `Z` → 25, `AA` → 26.
fn column_index(letters: &str) -> usize {
    letters
        .bytes()
        .fold(0usize, |acc, byte| acc * 26 + usize::from(byte - b'A' + 1))
        - 1
}

fn unescape_xml(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            match entity {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                _ => numeric_entity(entity).unwrap_or_else(|| caps[0].to_string()),
            }
        })
        .into_owned()
}

fn numeric_entity(entity: &str) -> Option<String> {
    let code = match entity.strip_prefix("#x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => entity.strip_prefix('#')?.parse::<u32>().ok()?,
    };
    char::from_u32(code).map(String::from)
}
