//! Manual lesson editing with conflict checks.
//!
//! # Responsibility
//! - Create, update, delete and read single lessons.
//! - Run teacher/classroom conflict detection before every write and apply
//!   the caller's policy.
//!
//! # Invariants
//! - An update never reports the edited lesson as conflicting with itself.
//! - Under `ConflictPolicy::Reject` nothing is written when conflicts exist.

use crate::model::lesson::{Lesson, LessonId, LessonValidationError};
use crate::repo::lesson_repo::{LessonEditStore, RepoError, RepoResult};
use crate::schedule::conflict::{describe_conflicts, LessonConflict};
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// What to do when a write double-books a teacher or classroom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Persist and return the conflicts for the operator to review.
    #[default]
    Warn,
    /// Refuse the write.
    Reject,
}

#[derive(Debug)]
pub enum LessonServiceError {
    Validation(LessonValidationError),
    /// Rejected under `ConflictPolicy::Reject`.
    Conflicts(Vec<LessonConflict>),
    NotFound(LessonId),
    Repo(RepoError),
}

impl Display for LessonServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Conflicts(conflicts) => write!(
                f,
                "lesson conflicts with {} existing lesson(s)",
                conflicts.len()
            ),
            Self::NotFound(id) => write!(f, "lesson not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LessonServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Conflicts(_) | Self::NotFound(_) => None,
        }
    }
}

impl From<RepoError> for LessonServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<LessonValidationError> for LessonServiceError {
    fn from(value: LessonValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Result of an accepted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonWrite {
    pub id: LessonId,
    /// Conflicts present at write time (always empty under `Reject`).
    pub conflicts: Vec<LessonConflict>,
}

pub struct LessonService<S: LessonEditStore> {
    store: S,
    max_lesson_number: u8,
}

impl<S: LessonEditStore> LessonService<S> {
    pub fn new(store: S, max_lesson_number: u8) -> Self {
        Self {
            store,
            max_lesson_number,
        }
    }

    /// Lessons double-booked with `lesson`, excluding `lesson` itself.
    pub fn check_conflicts(&self, lesson: &Lesson) -> RepoResult<Vec<LessonConflict>> {
        let slot = lesson.slot();
        let candidates = self.store.find_conflicting(&slot, Some(lesson.id))?;
        Ok(describe_conflicts(&slot, &candidates, Some(lesson.id)))
    }

    pub fn create_lesson(
        &self,
        lesson: &Lesson,
        policy: ConflictPolicy,
    ) -> Result<LessonWrite, LessonServiceError> {
        let conflicts = self.prepare_write(lesson, policy)?;
        let id = self.store.insert_lesson(lesson)?;
        info!(
            "event=lesson_create module=service status=ok conflicts={}",
            conflicts.len()
        );
        Ok(LessonWrite { id, conflicts })
    }

    pub fn update_lesson(
        &self,
        lesson: &Lesson,
        policy: ConflictPolicy,
    ) -> Result<LessonWrite, LessonServiceError> {
        if self.store.get_lesson(lesson.id)?.is_none() {
            return Err(LessonServiceError::NotFound(lesson.id));
        }
        let conflicts = self.prepare_write(lesson, policy)?;
        self.store.update_lesson(lesson)?;
        info!(
            "event=lesson_update module=service status=ok conflicts={}",
            conflicts.len()
        );
        Ok(LessonWrite {
            id: lesson.id,
            conflicts,
        })
    }

    pub fn delete_lesson(&self, id: LessonId) -> Result<(), LessonServiceError> {
        self.store.delete_lesson(id)?;
        info!("event=lesson_delete module=service status=ok");
        Ok(())
    }

    pub fn get_lesson(&self, id: LessonId) -> RepoResult<Option<Lesson>> {
        self.store.get_lesson(id)
    }

    fn prepare_write(
        &self,
        lesson: &Lesson,
        policy: ConflictPolicy,
    ) -> Result<Vec<LessonConflict>, LessonServiceError> {
        lesson.validate_with_limit(self.max_lesson_number)?;
        let conflicts = self.check_conflicts(lesson)?;
        if !conflicts.is_empty() {
            warn!(
                "event=lesson_conflict module=service status={} conflicts={}",
                match policy {
                    ConflictPolicy::Warn => "allowed",
                    ConflictPolicy::Reject => "rejected",
                },
                conflicts.len()
            );
            if policy == ConflictPolicy::Reject {
                return Err(LessonServiceError::Conflicts(conflicts));
            }
        }
        Ok(conflicts)
    }
}
