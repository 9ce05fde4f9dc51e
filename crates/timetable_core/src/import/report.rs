//! Import report and per-row error taxonomy.

use crate::import::record::RecordKind;
use crate::model::catalog::EntityKind;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Position of a row in its source, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", content = "number", rename_all = "snake_case")]
pub enum RowLocation {
    /// Line of a delimited text file.
    Line(usize),
    /// Row of a worksheet (the header is row 1).
    Row(usize),
}

impl RowLocation {
    pub fn number(self) -> usize {
        match self {
            Self::Line(number) | Self::Row(number) => number,
        }
    }

    pub fn is_tabular(self) -> bool {
        matches!(self, Self::Row(_))
    }
}

impl Display for RowLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Line(number) => write!(f, "line {number}"),
            Self::Row(number) => write!(f, "row {number}"),
        }
    }
}

/// Why a row (or the whole source) was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RowErrorKind {
    /// Fewer fields than the record kind requires.
    MissingData { expected: usize, found: usize },
    /// A required field is present but empty.
    EmptyField { field: &'static str },
    /// A typed field failed to parse or is out of range.
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
    /// A natural key does not resolve through the catalog.
    ReferenceNotFound { kind: EntityKind, value: String },
    /// The record's identity or natural key is already taken.
    Duplicate { detail: String },
    /// Storage failed while checking or committing this row.
    Storage { message: String },
    /// The whole source could not be opened or parsed.
    SourceUnreadable { message: String },
}

impl Display for RowErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingData { expected, found } => {
                write!(f, "missing data: expected {expected} fields, found {found}")
            }
            Self::EmptyField { field } => write!(f, "missing data: {field} is empty"),
            Self::InvalidField {
                field,
                value,
                reason,
            } => write!(f, "invalid {field} '{value}': {reason}"),
            Self::ReferenceNotFound { kind, value } => {
                write!(f, "reference not found: {kind} '{value}'")
            }
            Self::Duplicate { detail } => write!(f, "duplicate: {detail}"),
            Self::Storage { message } => write!(f, "storage error: {message}"),
            Self::SourceUnreadable { message } => write!(f, "failed to read source: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// `None` only for source-level failures.
    pub location: Option<RowLocation>,
    pub kind: RowErrorKind,
}

impl Display for RowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.location {
            Some(location) => write!(f, "{location}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub kind: RecordKind,
    pub accepted: usize,
    pub rejected: usize,
    /// Row errors ordered by source position.
    pub errors: Vec<RowError>,
    /// Set when the run stopped early; committed batches are kept.
    pub cancelled: bool,
}

impl ImportReport {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            accepted: 0,
            rejected: 0,
            errors: Vec::new(),
            cancelled: false,
        }
    }

    /// Report for a source that could not be read at all.
    pub fn unreadable(kind: RecordKind, message: impl Into<String>) -> Self {
        let mut report = Self::new(kind);
        report.errors.push(RowError {
            location: None,
            kind: RowErrorKind::SourceUnreadable {
                message: message.into(),
            },
        });
        report
    }

    pub(crate) fn reject(&mut self, location: RowLocation, kind: RowErrorKind) {
        self.rejected += 1;
        self.errors.push(RowError {
            location: Some(location),
            kind,
        });
    }

    pub fn is_source_unreadable(&self) -> bool {
        self.errors
            .iter()
            .any(|error| matches!(error.kind, RowErrorKind::SourceUnreadable { .. }))
    }
}
