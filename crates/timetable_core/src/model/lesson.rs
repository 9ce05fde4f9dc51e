//! Dated lesson model.
//!
//! # Responsibility
//! - Define the concrete lesson occurrence stored by `LessonStore`.
//! - Expose the identity key and the resource slot used by conflict checks.
//!
//! # Invariants
//! - `lesson_number` lies in `1..=MAX_LESSON_NUMBER` unless a narrower
//!   per-day limit is configured.
//! - `note`, when present, is not blank.

use crate::model::catalog::{ClassroomId, GroupId, SubjectId, TeacherId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one dated lesson.
pub type LessonId = Uuid;

/// Upper bound for lesson (period) numbers within one school day.
pub const MAX_LESSON_NUMBER: u8 = 8;

/// Identity key of a lesson. No two stored lessons share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LessonIdentity {
    pub date: NaiveDate,
    pub group_id: GroupId,
    pub lesson_number: u8,
}

/// Date/period position together with the resources a lesson occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceSlot {
    pub date: NaiveDate,
    pub lesson_number: u8,
    pub teacher_id: TeacherId,
    pub classroom_id: ClassroomId,
}

/// One concrete, dated occurrence of a class for a group and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    /// Calendar day without a time component.
    pub date: NaiveDate,
    /// Period index within the day, starting at 1.
    pub lesson_number: u8,
    pub group_id: GroupId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub classroom_id: ClassroomId,
    /// Free-text remark attached by manual edits.
    pub note: Option<String>,
}

impl Lesson {
    /// Creates a lesson with a generated stable id and no note.
    pub fn new(
        date: NaiveDate,
        lesson_number: u8,
        group_id: GroupId,
        subject_id: SubjectId,
        teacher_id: TeacherId,
        classroom_id: ClassroomId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            lesson_number,
            group_id,
            subject_id,
            teacher_id,
            classroom_id,
            note: None,
        }
    }

    pub fn identity(&self) -> LessonIdentity {
        LessonIdentity {
            date: self.date,
            group_id: self.group_id,
            lesson_number: self.lesson_number,
        }
    }

    pub fn slot(&self) -> ResourceSlot {
        ResourceSlot {
            date: self.date,
            lesson_number: self.lesson_number,
            teacher_id: self.teacher_id,
            classroom_id: self.classroom_id,
        }
    }

    /// Validates against the absolute period bound.
    pub fn validate(&self) -> Result<(), LessonValidationError> {
        self.validate_with_limit(MAX_LESSON_NUMBER)
    }

    /// Validates against a configured lessons-per-day limit.
    ///
    /// # Errors
    /// - `LessonNumberOutOfRange` when the period is `0` or above `max_lesson_number`.
    /// - `BlankNote` when a note is present but contains only whitespace.
    pub fn validate_with_limit(&self, max_lesson_number: u8) -> Result<(), LessonValidationError> {
        validate_lesson_number(self.lesson_number, max_lesson_number)?;
        if let Some(note) = self.note.as_deref() {
            if note.trim().is_empty() {
                return Err(LessonValidationError::BlankNote);
            }
        }
        Ok(())
    }
}

/// Checks that a period index lies in `1..=max_lesson_number`.
pub fn validate_lesson_number(
    lesson_number: u8,
    max_lesson_number: u8,
) -> Result<(), LessonValidationError> {
    if lesson_number == 0 || lesson_number > max_lesson_number {
        return Err(LessonValidationError::LessonNumberOutOfRange {
            value: lesson_number,
            max: max_lesson_number,
        });
    }
    Ok(())
}

/// Record-level validation failure for lessons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonValidationError {
    LessonNumberOutOfRange { value: u8, max: u8 },
    BlankNote,
}

impl Display for LessonValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LessonNumberOutOfRange { value, max } => {
                write!(f, "lesson number {value} is outside 1..={max}")
            }
            Self::BlankNote => write!(f, "lesson note must not be blank"),
        }
    }
}

impl Error for LessonValidationError {}
