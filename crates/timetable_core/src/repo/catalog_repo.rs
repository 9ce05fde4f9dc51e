//! Reference-entity catalog contracts and SQLite implementation.
//!
//! # Responsibility
//! - Resolve groups, subjects, teachers and classrooms by id and natural key.
//! - Insert reference entities in batches for bulk import.
//!
//! # Invariants
//! - Natural-key lookups are exact, case-sensitive matches on trimmed keys.
//! - `insert_entities` settles each entity on its own: a natural-key
//!   collision skips that entity and is reported, the rest are written.
//! - A teacher collides on either its short name or its full name.

use crate::model::catalog::{
    Classroom, ClassroomId, EntityKind, Group, GroupId, ReferenceEntity, Subject, SubjectId,
    Teacher, TeacherId,
};
use crate::repo::lesson_repo::{parse_uuid_column, RepoError, RepoResult};
use serde::Serialize;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

/// Read-only lookup of reference entities.
pub trait Catalog {
    fn group(&self, id: GroupId) -> RepoResult<Option<Group>>;
    fn subject(&self, id: SubjectId) -> RepoResult<Option<Subject>>;
    fn teacher(&self, id: TeacherId) -> RepoResult<Option<Teacher>>;
    fn classroom(&self, id: ClassroomId) -> RepoResult<Option<Classroom>>;

    fn group_by_name(&self, name: &str) -> RepoResult<Option<Group>>;
    fn subject_by_name(&self, name: &str) -> RepoResult<Option<Subject>>;
    fn teacher_by_short_name(&self, short_name: &str) -> RepoResult<Option<Teacher>>;
    fn teacher_by_full_name(&self, full_name: &str) -> RepoResult<Option<Teacher>>;
    fn classroom_by_name(&self, name: &str) -> RepoResult<Option<Classroom>>;

    /// All groups ordered by name.
    fn list_groups(&self) -> RepoResult<Vec<Group>>;
}

/// Outcome of one reference-entity batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityInsertReport {
    pub inserted: usize,
    /// Natural keys that were already taken when the batch was written.
    pub skipped: Vec<(EntityKind, String)>,
}

/// Batched writes used by reference-entity import.
pub trait CatalogWriter {
    fn insert_entities(&self, entities: &[ReferenceEntity]) -> RepoResult<EntityInsertReport>;
}

/// SQLite-backed catalog.
pub struct SqliteCatalog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_one<T>(
        &self,
        sql: &str,
        key: &str,
        parse: fn(&Row<'_>) -> RepoResult<T>,
    ) -> RepoResult<Option<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse(row)?)),
            None => Ok(None),
        }
    }
}

impl Catalog for SqliteCatalog<'_> {
    fn group(&self, id: GroupId) -> RepoResult<Option<Group>> {
        self.query_one(
            "SELECT uuid, name, year FROM groups WHERE uuid = ?1;",
            &id.to_string(),
            parse_group_row,
        )
    }

    fn subject(&self, id: SubjectId) -> RepoResult<Option<Subject>> {
        self.query_one(
            "SELECT uuid, name FROM subjects WHERE uuid = ?1;",
            &id.to_string(),
            parse_subject_row,
        )
    }

    fn teacher(&self, id: TeacherId) -> RepoResult<Option<Teacher>> {
        self.query_one(
            "SELECT uuid, full_name, short_name FROM teachers WHERE uuid = ?1;",
            &id.to_string(),
            parse_teacher_row,
        )
    }

    fn classroom(&self, id: ClassroomId) -> RepoResult<Option<Classroom>> {
        self.query_one(
            "SELECT uuid, name, capacity FROM classrooms WHERE uuid = ?1;",
            &id.to_string(),
            parse_classroom_row,
        )
    }

    fn group_by_name(&self, name: &str) -> RepoResult<Option<Group>> {
        self.query_one(
            "SELECT uuid, name, year FROM groups WHERE name = ?1;",
            name.trim(),
            parse_group_row,
        )
    }

    fn subject_by_name(&self, name: &str) -> RepoResult<Option<Subject>> {
        self.query_one(
            "SELECT uuid, name FROM subjects WHERE name = ?1;",
            name.trim(),
            parse_subject_row,
        )
    }

    fn teacher_by_short_name(&self, short_name: &str) -> RepoResult<Option<Teacher>> {
        self.query_one(
            "SELECT uuid, full_name, short_name FROM teachers WHERE short_name = ?1;",
            short_name.trim(),
            parse_teacher_row,
        )
    }

    fn teacher_by_full_name(&self, full_name: &str) -> RepoResult<Option<Teacher>> {
        self.query_one(
            "SELECT uuid, full_name, short_name FROM teachers
             WHERE full_name = ?1
             ORDER BY short_name ASC
             LIMIT 1;",
            full_name.trim(),
            parse_teacher_row,
        )
    }

    fn classroom_by_name(&self, name: &str) -> RepoResult<Option<Classroom>> {
        self.query_one(
            "SELECT uuid, name, capacity FROM classrooms WHERE name = ?1;",
            name.trim(),
            parse_classroom_row,
        )
    }

    fn list_groups(&self) -> RepoResult<Vec<Group>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, name, year FROM groups ORDER BY name ASC, uuid ASC;")?;
        let mut rows = stmt.query([])?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            groups.push(parse_group_row(row)?);
        }
        Ok(groups)
    }
}

impl CatalogWriter for SqliteCatalog<'_> {
    fn insert_entities(&self, entities: &[ReferenceEntity]) -> RepoResult<EntityInsertReport> {
        let mut report = EntityInsertReport::default();
        if entities.is_empty() {
            return Ok(report);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for entity in entities {
            if natural_key_taken(&tx, entity)? || insert_entity(&tx, entity)? == 0 {
                report
                    .skipped
                    .push((entity.kind(), entity.natural_key().to_string()));
            } else {
                report.inserted += 1;
            }
        }
        tx.commit()?;

        debug!(
            "event=catalog_batch_insert module=repo status=ok inserted={} skipped={}",
            report.inserted,
            report.skipped.len()
        );
        Ok(report)
    }
}

fn natural_key_taken(conn: &Connection, entity: &ReferenceEntity) -> RepoResult<bool> {
    let found = match entity {
        ReferenceEntity::Group(group) => conn
            .query_row("SELECT 1 FROM groups WHERE name = ?1;", [&group.name], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?,
        ReferenceEntity::Subject(subject) => conn
            .query_row(
                "SELECT 1 FROM subjects WHERE name = ?1;",
                [&subject.name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?,
        ReferenceEntity::Classroom(classroom) => conn
            .query_row(
                "SELECT 1 FROM classrooms WHERE name = ?1;",
                [&classroom.name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?,
        ReferenceEntity::Teacher(teacher) => conn
            .query_row(
                "SELECT 1 FROM teachers WHERE short_name = ?1 OR full_name = ?2 LIMIT 1;",
                [&teacher.short_name, &teacher.full_name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?,
    };
    Ok(found.is_some())
}

/// Inserts one entity; returns 0 when a uniqueness constraint swallowed it.
fn insert_entity(conn: &Connection, entity: &ReferenceEntity) -> RepoResult<usize> {
    let changed = match entity {
        ReferenceEntity::Group(group) => conn.execute(
            "INSERT INTO groups (uuid, name, year) VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING;",
            params![group.id.to_string(), group.name, i64::from(group.year)],
        )?,
        ReferenceEntity::Subject(subject) => conn.execute(
            "INSERT INTO subjects (uuid, name) VALUES (?1, ?2) ON CONFLICT DO NOTHING;",
            params![subject.id.to_string(), subject.name],
        )?,
        ReferenceEntity::Teacher(teacher) => conn.execute(
            "INSERT INTO teachers (uuid, full_name, short_name) VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING;",
            params![
                teacher.id.to_string(),
                teacher.full_name,
                teacher.short_name
            ],
        )?,
        ReferenceEntity::Classroom(classroom) => conn.execute(
            "INSERT INTO classrooms (uuid, name, capacity) VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING;",
            params![
                classroom.id.to_string(),
                classroom.name,
                i64::from(classroom.capacity)
            ],
        )?,
    };
    Ok(changed)
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<Group> {
    Ok(Group {
        id: parse_uuid_column(row, "uuid", "groups.uuid")?,
        name: row.get("name")?,
        year: parse_u32_column(row, "year", "groups.year")?,
    })
}

fn parse_subject_row(row: &Row<'_>) -> RepoResult<Subject> {
    Ok(Subject {
        id: parse_uuid_column(row, "uuid", "subjects.uuid")?,
        name: row.get("name")?,
    })
}

fn parse_teacher_row(row: &Row<'_>) -> RepoResult<Teacher> {
    Ok(Teacher {
        id: parse_uuid_column(row, "uuid", "teachers.uuid")?,
        full_name: row.get("full_name")?,
        short_name: row.get("short_name")?,
    })
}

fn parse_classroom_row(row: &Row<'_>) -> RepoResult<Classroom> {
    Ok(Classroom {
        id: parse_uuid_column(row, "uuid", "classrooms.uuid")?,
        name: row.get("name")?,
        capacity: parse_u32_column(row, "capacity", "classrooms.capacity")?,
    })
}

fn parse_u32_column(row: &Row<'_>, name: &str, column: &'static str) -> RepoResult<u32> {
    let value: i64 = row.get(name)?;
    u32::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid value `{value}` in {column}")))
}
