//! Weekly recurrence template model.
//!
//! # Responsibility
//! - Describe one weekly rule from which dated lessons are generated.
//! - Map weekdays to the stored `0=Monday..6=Sunday` index.
//!
//! # Invariants
//! - A template carries no date; it applies to every week of its parity.
//! - `lesson_number` obeys the same bounds as `Lesson::lesson_number`.

use crate::model::catalog::{ClassroomId, GroupId, SubjectId, TeacherId};
use crate::model::lesson::{validate_lesson_number, LessonValidationError, MAX_LESSON_NUMBER};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TemplateId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTemplate {
    pub id: TemplateId,
    pub day_of_week: Weekday,
    pub lesson_number: u8,
    /// Parity this rule applies to: `true` for even weeks, `false` for odd.
    pub is_even_week: bool,
    pub group_id: GroupId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub classroom_id: ClassroomId,
}

impl WeeklyTemplate {
    /// Creates a template with a generated stable id.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        day_of_week: Weekday,
        lesson_number: u8,
        is_even_week: bool,
        group_id: GroupId,
        subject_id: SubjectId,
        teacher_id: TeacherId,
        classroom_id: ClassroomId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            day_of_week,
            lesson_number,
            is_even_week,
            group_id,
            subject_id,
            teacher_id,
            classroom_id,
        }
    }

    pub fn validate(&self) -> Result<(), LessonValidationError> {
        validate_lesson_number(self.lesson_number, MAX_LESSON_NUMBER)
    }

    /// Returns whether the rule fires on `date` given that date's parity.
    pub fn applies_to(&self, date: NaiveDate, is_even_week: bool) -> bool {
        date.weekday() == self.day_of_week && self.is_even_week == is_even_week
    }
}

/// Stored weekday index: `0=Monday .. 6=Sunday`.
pub fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_monday() as u8
}

/// Inverse of [`weekday_index`]; `None` for values above 6.
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}
