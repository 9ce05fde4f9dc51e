//! Teacher/classroom double-booking detection.
//!
//! # Responsibility
//! - Find lessons occupying the same date and period with the same teacher
//!   or the same classroom as a candidate.
//! - Scan a whole lesson set for conflicting pairs.
//!
//! # Invariants
//! - Detection is advisory: nothing here mutates or blocks a write.
//! - The relation is symmetric; the excluded id never appears in results.

use crate::model::lesson::{Lesson, LessonId, ResourceSlot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which resource two lessons in the same slot share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedResource {
    Teacher,
    Classroom,
    TeacherAndClassroom,
}

impl SharedResource {
    /// Returns the shared resource when `a` and `b` conflict.
    pub fn between(a: &ResourceSlot, b: &ResourceSlot) -> Option<Self> {
        if a.date != b.date || a.lesson_number != b.lesson_number {
            return None;
        }
        match (a.teacher_id == b.teacher_id, a.classroom_id == b.classroom_id) {
            (true, true) => Some(Self::TeacherAndClassroom),
            (true, false) => Some(Self::Teacher),
            (false, true) => Some(Self::Classroom),
            (false, false) => None,
        }
    }
}

/// One lesson that conflicts with a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonConflict {
    pub lesson: Lesson,
    pub shared: SharedResource,
}

/// Unordered pair of conflicting lessons found by [`find_all_conflicts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPair {
    pub date: NaiveDate,
    pub lesson_number: u8,
    pub first: LessonId,
    pub second: LessonId,
    pub shared: SharedResource,
}

/// Returns every lesson in `existing` that conflicts with `candidate`.
///
/// `exclude` removes the lesson being edited in place.
pub fn find_conflicts<'a>(
    candidate: &ResourceSlot,
    existing: &'a [Lesson],
    exclude: Option<LessonId>,
) -> Vec<&'a Lesson> {
    existing
        .iter()
        .filter(|lesson| Some(lesson.id) != exclude)
        .filter(|lesson| SharedResource::between(candidate, &lesson.slot()).is_some())
        .collect()
}

/// Like [`find_conflicts`] but annotates each hit with the shared resource.
pub fn describe_conflicts(
    candidate: &ResourceSlot,
    existing: &[Lesson],
    exclude: Option<LessonId>,
) -> Vec<LessonConflict> {
    existing
        .iter()
        .filter(|lesson| Some(lesson.id) != exclude)
        .filter_map(|lesson| {
            SharedResource::between(candidate, &lesson.slot()).map(|shared| LessonConflict {
                lesson: lesson.clone(),
                shared,
            })
        })
        .collect()
}

/// Returns each conflicting pair in `lessons` once, ordered by date and period.
pub fn find_all_conflicts(lessons: &[Lesson]) -> Vec<ConflictPair> {
    let mut buckets: BTreeMap<(NaiveDate, u8), Vec<&Lesson>> = BTreeMap::new();
    for lesson in lessons {
        buckets
            .entry((lesson.date, lesson.lesson_number))
            .or_default()
            .push(lesson);
    }

    let mut pairs = Vec::new();
    for ((date, lesson_number), bucket) in buckets {
        for (index, first) in bucket.iter().enumerate() {
            for second in &bucket[index + 1..] {
                if first.id == second.id {
                    continue;
                }
                if let Some(shared) = SharedResource::between(&first.slot(), &second.slot()) {
                    pairs.push(ConflictPair {
                        date,
                        lesson_number,
                        first: first.id,
                        second: second.id,
                        shared,
                    });
                }
            }
        }
    }
    pairs
}
