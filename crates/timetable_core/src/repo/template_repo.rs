//! Weekly template storage.
//!
//! Templates are authored elsewhere and consumed read-only by generation;
//! this repository only stores, lists and removes them.

use crate::model::template::{weekday_from_index, weekday_index, TemplateId, WeeklyTemplate};
use crate::repo::lesson_repo::{parse_uuid_column, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

pub trait TemplateRepository {
    fn create_template(&self, template: &WeeklyTemplate) -> RepoResult<TemplateId>;
    /// All templates ordered by weekday, parity, lesson number.
    fn list_templates(&self) -> RepoResult<Vec<WeeklyTemplate>>;
    fn delete_template(&self, id: TemplateId) -> RepoResult<()>;
}

pub struct SqliteTemplateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTemplateRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TemplateRepository for SqliteTemplateRepository<'_> {
    fn create_template(&self, template: &WeeklyTemplate) -> RepoResult<TemplateId> {
        template.validate()?;
        self.conn.execute(
            "INSERT INTO week_templates (
                uuid,
                day_of_week,
                lesson_number,
                is_even_week,
                group_uuid,
                subject_uuid,
                teacher_uuid,
                classroom_uuid
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                template.id.to_string(),
                i64::from(weekday_index(template.day_of_week)),
                i64::from(template.lesson_number),
                template.is_even_week,
                template.group_id.to_string(),
                template.subject_id.to_string(),
                template.teacher_id.to_string(),
                template.classroom_id.to_string(),
            ],
        )?;
        Ok(template.id)
    }

    fn list_templates(&self) -> RepoResult<Vec<WeeklyTemplate>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                uuid,
                day_of_week,
                lesson_number,
                is_even_week,
                group_uuid,
                subject_uuid,
                teacher_uuid,
                classroom_uuid
             FROM week_templates
             ORDER BY day_of_week ASC, is_even_week ASC, lesson_number ASC, uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next()? {
            templates.push(parse_template_row(row)?);
        }
        Ok(templates)
    }

    fn delete_template(&self, id: TemplateId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM week_templates WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

fn parse_template_row(row: &Row<'_>) -> RepoResult<WeeklyTemplate> {
    let day_index: i64 = row.get("day_of_week")?;
    let day_of_week = u8::try_from(day_index)
        .ok()
        .and_then(weekday_from_index)
        .ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid day_of_week `{day_index}` in week_templates.day_of_week"
            ))
        })?;

    let raw_number: i64 = row.get("lesson_number")?;
    let lesson_number = u8::try_from(raw_number).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid lesson number `{raw_number}` in week_templates.lesson_number"
        ))
    })?;

    let template = WeeklyTemplate {
        id: parse_uuid_column(row, "uuid", "week_templates.uuid")?,
        day_of_week,
        lesson_number,
        is_even_week: row.get("is_even_week")?,
        group_id: parse_uuid_column(row, "group_uuid", "week_templates.group_uuid")?,
        subject_id: parse_uuid_column(row, "subject_uuid", "week_templates.subject_uuid")?,
        teacher_id: parse_uuid_column(row, "teacher_uuid", "week_templates.teacher_uuid")?,
        classroom_id: parse_uuid_column(row, "classroom_uuid", "week_templates.classroom_uuid")?,
    };
    template.validate()?;
    Ok(template)
}
