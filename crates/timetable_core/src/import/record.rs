//! Record kinds and their field parsers.
//!
//! # Responsibility
//! - Map each importable record kind to its field layout.
//! - Turn raw fields into typed, not-yet-resolved records.
//!
//! # Invariants
//! - Every kind is handled by an exhaustive match; there is no string-keyed
//!   dispatch.
//! - Parsers never touch the catalog or the store.

use crate::import::report::{RowErrorKind, RowLocation};
use crate::model::catalog::{Classroom, Group, Subject, Teacher};
use crate::model::lesson::{validate_lesson_number, LessonValidationError};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const EXCEL_SERIAL_MAX: f64 = 2_958_465.0;

/// Kind of record an import run reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// `Date;Group;LessonNumber;Subject;TeacherShortName;Classroom`
    Lesson,
    /// `FullName;ShortName`
    Teacher,
    /// `Name;Capacity`
    Classroom,
    /// `Name`
    Subject,
    /// `Name;Year`
    Group,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        Self::Lesson,
        Self::Teacher,
        Self::Classroom,
        Self::Subject,
        Self::Group,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Lesson => "lesson",
            Self::Teacher => "teacher",
            Self::Classroom => "classroom",
            Self::Subject => "subject",
            Self::Group => "group",
        }
    }

    /// Required number of fields per row.
    pub fn field_count(self) -> usize {
        match self {
            Self::Lesson => 6,
            Self::Teacher | Self::Classroom | Self::Group => 2,
            Self::Subject => 1,
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lesson" | "lessons" | "schedule" => Ok(Self::Lesson),
            "teacher" | "teachers" => Ok(Self::Teacher),
            "classroom" | "classrooms" | "room" | "rooms" => Ok(Self::Classroom),
            "subject" | "subjects" => Ok(Self::Subject),
            "group" | "groups" => Ok(Self::Group),
            other => Err(format!(
                "unknown record kind `{other}`; expected lesson|teacher|classroom|subject|group"
            )),
        }
    }
}

/// Lesson row with typed fields and unresolved natural keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonRow {
    pub date: NaiveDate,
    pub group_name: String,
    pub lesson_number: u8,
    pub subject_name: String,
    pub teacher_short_name: String,
    pub classroom_name: String,
}

/// Result of parsing one row for its record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRecord {
    Lesson(LessonRow),
    Teacher(Teacher),
    Classroom(Classroom),
    Subject(Subject),
    Group(Group),
}

/// Parses the fields of one row.
///
/// Extra trailing fields beyond the kind's layout are ignored.
pub fn parse_record(
    kind: RecordKind,
    fields: &[String],
    location: RowLocation,
    max_lesson_number: u8,
) -> Result<ParsedRecord, RowErrorKind> {
    let expected = kind.field_count();
    if fields.len() < expected {
        return Err(RowErrorKind::MissingData {
            expected,
            found: fields.len(),
        });
    }

    match kind {
        RecordKind::Lesson => {
            parse_lesson(fields, location, max_lesson_number).map(ParsedRecord::Lesson)
        }
        RecordKind::Teacher => {
            let full_name = required(fields, 0, "full name")?;
            let short_name = required(fields, 1, "short name")?;
            Ok(ParsedRecord::Teacher(Teacher::new(full_name, short_name)))
        }
        RecordKind::Classroom => {
            let name = required(fields, 0, "classroom name")?;
            let capacity = parse_count(required(fields, 1, "capacity")?, "capacity", location)?;
            Ok(ParsedRecord::Classroom(Classroom::new(name, capacity)))
        }
        RecordKind::Subject => {
            let name = required(fields, 0, "subject name")?;
            Ok(ParsedRecord::Subject(Subject::new(name)))
        }
        RecordKind::Group => {
            let name = required(fields, 0, "group name")?;
            let year = parse_count(required(fields, 1, "year")?, "year", location)?;
            Ok(ParsedRecord::Group(Group::new(name, year)))
        }
    }
}

fn parse_lesson(
    fields: &[String],
    location: RowLocation,
    max_lesson_number: u8,
) -> Result<LessonRow, RowErrorKind> {
    let date = parse_date(required(fields, 0, "date")?, location)?;
    let group_name = required(fields, 1, "group")?;
    let raw_number = required(fields, 2, "lesson number")?;
    let subject_name = required(fields, 3, "subject")?;
    let teacher_short_name = required(fields, 4, "teacher")?;
    let classroom_name = required(fields, 5, "classroom")?;

    let number = parse_integer(raw_number, location).ok_or_else(|| invalid(
        "lesson number",
        raw_number,
        "expected an integer",
    ))?;
    let lesson_number = u8::try_from(number)
        .map_err(|_| invalid("lesson number", raw_number, "out of range"))?;
    validate_lesson_number(lesson_number, max_lesson_number).map_err(
        |err: LessonValidationError| invalid("lesson number", raw_number, &err.to_string()),
    )?;

    Ok(LessonRow {
        date,
        group_name: group_name.to_string(),
        lesson_number,
        subject_name: subject_name.to_string(),
        teacher_short_name: teacher_short_name.to_string(),
        classroom_name: classroom_name.to_string(),
    })
}

/// Parses an import date.
///
/// Accepts `dd.MM.yyyy`, `dd.MM.yy` and `yyyy-MM-dd`; a trailing time part
/// (`10.11.2025 0:00:00`) is ignored. Spreadsheet rows also accept an Excel
/// serial day number.
pub fn parse_date(raw: &str, location: RowLocation) -> Result<NaiveDate, RowErrorKind> {
    let value = raw.split_whitespace().next().unwrap_or_default();
    let parsed = if value.contains('-') {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
    } else if value.contains('.') {
        match value.rsplit('.').next().map(str::len) {
            Some(2) => NaiveDate::parse_from_str(value, "%d.%m.%y").ok(),
            Some(4) => NaiveDate::parse_from_str(value, "%d.%m.%Y").ok(),
            _ => None,
        }
    } else {
        None
    };
    let parsed = match parsed {
        None if location.is_tabular() => excel_serial_date(value),
        other => other,
    };

    parsed.ok_or_else(|| invalid("date", raw, "expected dd.MM.yyyy, dd.MM.yy or yyyy-MM-dd"))
}

fn excel_serial_date(value: &str) -> Option<NaiveDate> {
    let serial = value.parse::<f64>().ok()?;
    if !(1.0..=EXCEL_SERIAL_MAX).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Integers; spreadsheet rows also accept integral decimals such as `2.0`.
fn parse_integer(raw: &str, location: RowLocation) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    if !location.is_tabular() {
        return None;
    }
    let value = raw.parse::<f64>().ok()?;
    (value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

fn parse_count(raw: &str, field: &'static str, location: RowLocation) -> Result<u32, RowErrorKind> {
    let value = parse_integer(raw, location)
        .ok_or_else(|| invalid(field, raw, "expected an integer"))?;
    u32::try_from(value).map_err(|_| invalid(field, raw, "must not be negative"))
}

fn required<'f>(
    fields: &'f [String],
    index: usize,
    field: &'static str,
) -> Result<&'f str, RowErrorKind> {
    match fields.get(index).map(|value| value.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RowErrorKind::EmptyField { field }),
    }
}

fn invalid(field: &'static str, value: &str, reason: &str) -> RowErrorKind {
    RowErrorKind::InvalidField {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
