//! Lesson store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the four lookups/writes the generation and reconciliation
//!   pipelines depend on (`LessonStore`).
//! - Provide single-lesson reads and edits for manual editing
//!   (`LessonEditStore`).
//!
//! # Invariants
//! - Write paths call `Lesson::validate()` before SQL mutations.
//! - `(date, group_uuid, lesson_number)` uniqueness is enforced by the table;
//!   batch inserts report colliding rows as skipped instead of failing.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::catalog::GroupId;
use crate::model::lesson::{
    Lesson, LessonId, LessonIdentity, LessonValidationError, ResourceSlot,
};
use chrono::{Duration, NaiveDate};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const LESSON_SELECT_SQL: &str = "SELECT
    uuid,
    date,
    lesson_number,
    group_uuid,
    subject_uuid,
    teacher_uuid,
    classroom_uuid,
    note
FROM lessons";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by lesson, catalog and template storage.
#[derive(Debug)]
pub enum RepoError {
    Validation(LessonValidationError),
    Db(DbError),
    NotFound(Uuid),
    /// Another lesson already occupies this identity.
    DuplicateIdentity(LessonIdentity),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::DuplicateIdentity(identity) => write!(
                f,
                "lesson already exists: {} group {} lesson {}",
                identity.date, identity.group_id, identity.lesson_number
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LessonValidationError> for RepoError {
    fn from(value: LessonValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Seven days starting at `start`.
    pub fn week_from(start: NaiveDate) -> Self {
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Outcome of [`LessonStore::insert_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInsertReport {
    pub inserted: usize,
    /// Identities already taken when the batch was written.
    pub skipped: Vec<LessonIdentity>,
}

/// Storage operations the generation and reconciliation pipelines rely on.
pub trait LessonStore {
    fn find_by_identity(&self, identity: &LessonIdentity) -> RepoResult<Option<Lesson>>;
    /// Lessons sharing the slot's date and period and its teacher or classroom.
    fn find_conflicting(
        &self,
        slot: &ResourceSlot,
        exclude: Option<LessonId>,
    ) -> RepoResult<Vec<Lesson>>;
    /// Writes all lessons in one transaction, skipping taken identities.
    fn insert_batch(&self, lessons: &[Lesson]) -> RepoResult<BatchInsertReport>;
    /// Lessons in `range`, ordered by date then lesson number.
    fn query(&self, range: DateRange, group_id: Option<GroupId>) -> RepoResult<Vec<Lesson>>;
}

/// Single-lesson operations used by manual edits.
pub trait LessonEditStore: LessonStore {
    fn get_lesson(&self, id: LessonId) -> RepoResult<Option<Lesson>>;
    fn insert_lesson(&self, lesson: &Lesson) -> RepoResult<LessonId>;
    fn update_lesson(&self, lesson: &Lesson) -> RepoResult<()>;
    fn delete_lesson(&self, id: LessonId) -> RepoResult<()>;
}

/// SQLite-backed lesson store.
pub struct SqliteLessonStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLessonStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LessonStore for SqliteLessonStore<'_> {
    fn find_by_identity(&self, identity: &LessonIdentity) -> RepoResult<Option<Lesson>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LESSON_SELECT_SQL}
             WHERE date = ?1
               AND group_uuid = ?2
               AND lesson_number = ?3;"
        ))?;
        let mut rows = stmt.query(params![
            identity.date,
            identity.group_id.to_string(),
            i64::from(identity.lesson_number),
        ])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_lesson_row(row)?)),
            None => Ok(None),
        }
    }

    fn find_conflicting(
        &self,
        slot: &ResourceSlot,
        exclude: Option<LessonId>,
    ) -> RepoResult<Vec<Lesson>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LESSON_SELECT_SQL}
             WHERE date = ?1
               AND lesson_number = ?2
               AND (teacher_uuid = ?3 OR classroom_uuid = ?4)
               AND (?5 IS NULL OR uuid <> ?5)
             ORDER BY group_uuid ASC;"
        ))?;
        let mut rows = stmt.query(params![
            slot.date,
            i64::from(slot.lesson_number),
            slot.teacher_id.to_string(),
            slot.classroom_id.to_string(),
            exclude.map(|id| id.to_string()),
        ])?;
        collect_lessons(&mut rows)
    }

    fn insert_batch(&self, lessons: &[Lesson]) -> RepoResult<BatchInsertReport> {
        for lesson in lessons {
            lesson.validate()?;
        }
        if lessons.is_empty() {
            return Ok(BatchInsertReport::default());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut report = BatchInsertReport::default();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO lessons (
                    uuid,
                    date,
                    lesson_number,
                    group_uuid,
                    subject_uuid,
                    teacher_uuid,
                    classroom_uuid,
                    note
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT (date, group_uuid, lesson_number) DO NOTHING;",
            )?;
            for lesson in lessons {
                let changed = stmt.execute(lesson_params(lesson))?;
                if changed == 0 {
                    report.skipped.push(lesson.identity());
                } else {
                    report.inserted += 1;
                }
            }
        }
        tx.commit()?;

        debug!(
            "event=lesson_batch_insert module=repo status=ok inserted={} skipped={}",
            report.inserted,
            report.skipped.len()
        );
        Ok(report)
    }

    fn query(&self, range: DateRange, group_id: Option<GroupId>) -> RepoResult<Vec<Lesson>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!("{LESSON_SELECT_SQL} WHERE date >= ? AND date <= ?");
        let mut bind_values = vec![
            Value::Text(range.start.format("%Y-%m-%d").to_string()),
            Value::Text(range.end.format("%Y-%m-%d").to_string()),
        ];
        if let Some(group_id) = group_id {
            sql.push_str(" AND group_uuid = ?");
            bind_values.push(Value::Text(group_id.to_string()));
        }
        sql.push_str(" ORDER BY date ASC, lesson_number ASC, group_uuid ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        collect_lessons(&mut rows)
    }
}

impl LessonEditStore for SqliteLessonStore<'_> {
    fn get_lesson(&self, id: LessonId) -> RepoResult<Option<Lesson>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LESSON_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_lesson_row(row)?)),
            None => Ok(None),
        }
    }

    fn insert_lesson(&self, lesson: &Lesson) -> RepoResult<LessonId> {
        let report = self.insert_batch(std::slice::from_ref(lesson))?;
        if report.inserted == 0 {
            return Err(RepoError::DuplicateIdentity(lesson.identity()));
        }
        Ok(lesson.id)
    }

    fn update_lesson(&self, lesson: &Lesson) -> RepoResult<()> {
        lesson.validate()?;

        if let Some(occupant) = self.find_by_identity(&lesson.identity())? {
            if occupant.id != lesson.id {
                return Err(RepoError::DuplicateIdentity(lesson.identity()));
            }
        }

        let changed = self
            .conn
            .execute(
                "UPDATE lessons
                 SET
                    date = ?2,
                    lesson_number = ?3,
                    group_uuid = ?4,
                    subject_uuid = ?5,
                    teacher_uuid = ?6,
                    classroom_uuid = ?7,
                    note = ?8,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?1;",
                lesson_params(lesson),
            )
            .map_err(|err| map_unique_violation(err, lesson))?;

        if changed == 0 {
            return Err(RepoError::NotFound(lesson.id));
        }
        Ok(())
    }

    fn delete_lesson(&self, id: LessonId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM lessons WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

type LessonParams = (
    String,
    NaiveDate,
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
);

fn lesson_params(lesson: &Lesson) -> LessonParams {
    (
        lesson.id.to_string(),
        lesson.date,
        i64::from(lesson.lesson_number),
        lesson.group_id.to_string(),
        lesson.subject_id.to_string(),
        lesson.teacher_id.to_string(),
        lesson.classroom_id.to_string(),
        lesson.note.clone(),
    )
}

fn map_unique_violation(err: rusqlite::Error, lesson: &Lesson) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            RepoError::DuplicateIdentity(lesson.identity())
        }
        _ => err.into(),
    }
}

fn collect_lessons(rows: &mut rusqlite::Rows<'_>) -> RepoResult<Vec<Lesson>> {
    let mut lessons = Vec::new();
    while let Some(row) = rows.next()? {
        lessons.push(parse_lesson_row(row)?);
    }
    Ok(lessons)
}

fn parse_lesson_row(row: &Row<'_>) -> RepoResult<Lesson> {
    let raw_number: i64 = row.get("lesson_number")?;
    let lesson_number = u8::try_from(raw_number).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid lesson number `{raw_number}` in lessons.lesson_number"
        ))
    })?;

    let lesson = Lesson {
        id: parse_uuid_column(row, "uuid", "lessons.uuid")?,
        date: row.get("date")?,
        lesson_number,
        group_id: parse_uuid_column(row, "group_uuid", "lessons.group_uuid")?,
        subject_id: parse_uuid_column(row, "subject_uuid", "lessons.subject_uuid")?,
        teacher_id: parse_uuid_column(row, "teacher_uuid", "lessons.teacher_uuid")?,
        classroom_id: parse_uuid_column(row, "classroom_uuid", "lessons.classroom_uuid")?,
        note: row.get("note")?,
    };
    lesson.validate()?;
    Ok(lesson)
}

/// Reads a text column and parses it as UUID.
pub(crate) fn parse_uuid_column(
    row: &Row<'_>,
    name: &str,
    column: &'static str,
) -> RepoResult<Uuid> {
    let text: String = row.get(name)?;
    Uuid::parse_str(&text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{text}` in {column}")))
}
