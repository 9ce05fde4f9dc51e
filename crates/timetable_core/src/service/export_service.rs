//! Text export of stored lessons.
//!
//! # Responsibility
//! - Render lessons of a date range in the lesson import row format
//!   `dd.MM.yyyy;Group;LessonNumber;Subject;TeacherShortName;Classroom`.
//!
//! # Invariants
//! - Output re-imports cleanly: every line resolves through the same
//!   natural keys it was rendered from. A key holding a field delimiter
//!   cannot round-trip and fails the export with `ExportError::DelimiterInName`.
//! - Lines are ordered by date, lesson number, then group name.

use crate::import::row::FIELD_DELIMITERS;
use crate::model::catalog::{EntityKind, GroupId};
use crate::model::lesson::Lesson;
use crate::repo::catalog_repo::Catalog;
use crate::repo::lesson_repo::{DateRange, LessonStore, RepoError};
use log::info;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum ExportError {
    UnknownGroup(String),
    /// A stored lesson points at a reference entity that no longer exists.
    DanglingReference { kind: EntityKind, id: Uuid },
    /// A natural key contains `;`, `,` or a tab and would split on re-import.
    DelimiterInName { kind: EntityKind, name: String },
    Repo(RepoError),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownGroup(name) => write!(f, "group not found: '{name}'"),
            Self::DanglingReference { kind, id } => {
                write!(f, "lesson references missing {kind} {id}")
            }
            Self::DelimiterInName { kind, name } => {
                write!(f, "{kind} name '{name}' contains a field delimiter")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ExportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub struct ExportService<C: Catalog, S: LessonStore> {
    catalog: C,
    store: S,
}

/// Natural keys already looked up during one export.
#[derive(Default)]
struct NameCache {
    names: HashMap<(EntityKind, Uuid), String>,
}

impl<C: Catalog, S: LessonStore> ExportService<C, S> {
    pub fn new(catalog: C, store: S) -> Self {
        Self { catalog, store }
    }

    /// Renders lessons in `range`, optionally only those of `group_name`.
    pub fn export_lessons(
        &self,
        range: DateRange,
        group_name: Option<&str>,
    ) -> Result<String, ExportError> {
        let group_id: Option<GroupId> = match group_name {
            Some(name) => Some(
                self.catalog
                    .group_by_name(name)?
                    .ok_or_else(|| ExportError::UnknownGroup(name.to_string()))?
                    .id,
            ),
            None => None,
        };

        let lessons = self.store.query(range, group_id)?;
        let mut cache = NameCache::default();
        let mut lines = Vec::with_capacity(lessons.len());
        for lesson in &lessons {
            lines.push(self.render_line(lesson, &mut cache)?);
        }
        lines.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            "event=lesson_export module=service status=ok lessons={}",
            lines.len()
        );
        Ok(lines
            .into_iter()
            .map(|(_, line)| line + "\n")
            .collect::<String>())
    }

    fn render_line(
        &self,
        lesson: &Lesson,
        cache: &mut NameCache,
    ) -> Result<((chrono::NaiveDate, u8, String), String), ExportError> {
        let group = self.name_of(EntityKind::Group, lesson.group_id, cache)?;
        let subject = self.name_of(EntityKind::Subject, lesson.subject_id, cache)?;
        let teacher = self.name_of(EntityKind::Teacher, lesson.teacher_id, cache)?;
        let classroom = self.name_of(EntityKind::Classroom, lesson.classroom_id, cache)?;

        let line = format!(
            "{};{};{};{};{};{}",
            lesson.date.format("%d.%m.%Y"),
            group,
            lesson.lesson_number,
            subject,
            teacher,
            classroom
        );
        Ok(((lesson.date, lesson.lesson_number, group), line))
    }

    fn name_of(
        &self,
        kind: EntityKind,
        id: Uuid,
        cache: &mut NameCache,
    ) -> Result<String, ExportError> {
        if let Some(name) = cache.names.get(&(kind, id)) {
            return Ok(name.clone());
        }
        let name = match kind {
            EntityKind::Group => self.catalog.group(id)?.map(|group| group.name),
            EntityKind::Subject => self.catalog.subject(id)?.map(|subject| subject.name),
            EntityKind::Teacher => self.catalog.teacher(id)?.map(|teacher| teacher.short_name),
            EntityKind::Classroom => self.catalog.classroom(id)?.map(|room| room.name),
        }
        .ok_or(ExportError::DanglingReference { kind, id })?;
        if name.contains(FIELD_DELIMITERS) {
            return Err(ExportError::DelimiterInName { kind, name });
        }
        cache.names.insert((kind, id), name.clone());
        Ok(name)
    }
}
