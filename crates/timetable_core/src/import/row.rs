//! Raw row splitting.
//!
//! Any of tab, `;` or `,` separates fields. Fields are trimmed and trailing
//! empty fields are dropped; interior empty fields are kept so that column
//! positions never shift.

use crate::import::report::RowLocation;

pub const FIELD_DELIMITERS: [char; 3] = ['\t', ';', ','];

/// One non-blank row read from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub location: RowLocation,
    pub fields: Vec<String>,
}

impl SourceRow {
    pub fn new(location: RowLocation, fields: Vec<String>) -> Self {
        Self { location, fields }
    }

    /// Builds a text row from one line, or `None` for a blank line.
    pub fn from_line(line_number: usize, line: &str) -> Option<Self> {
        let fields = split_row(line);
        if fields.is_empty() {
            return None;
        }
        Some(Self::new(RowLocation::Line(line_number), fields))
    }
}

/// Splits one text line into trimmed fields.
pub fn split_row(line: &str) -> Vec<String> {
    let mut fields: Vec<String> = line
        .split(FIELD_DELIMITERS)
        .map(|field| field.trim().to_string())
        .collect();
    while fields.last().is_some_and(|field| field.is_empty()) {
        fields.pop();
    }
    fields
}
