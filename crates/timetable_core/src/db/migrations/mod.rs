//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A migrated database always carries a unique index on the lesson
//!   identity `(date, group_uuid, lesson_number)`; without it open fails.
//!
//! # Schema
//! - v1: reference entities (`groups`, `subjects`, `teachers`, `classrooms`).
//! - v2: dated `lessons` with the `(date, group_uuid, lesson_number)` key.
//! - v3: `week_templates` recurrence rules.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "reference",
        sql: include_str!("0001_reference.sql"),
    },
    Migration {
        version: 2,
        name: "lessons",
        sql: include_str!("0002_lessons.sql"),
    },
    Migration {
        version: 3,
        name: "week_templates",
        sql: include_str!("0003_week_templates.sql"),
    },
];

/// Columns of the lesson identity key the store relies on for race-free inserts.
pub const LESSON_IDENTITY_COLUMNS: [&str; 3] = ["date", "group_uuid", "lesson_number"];

/// Schema versions before and after one `apply_migrations` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<&'static str>,
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies pending migrations, then checks the lesson identity constraint.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    let from_version = current_user_version(conn)?;
    let latest = latest_version();

    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let mut applied = Vec::new();
    if from_version < latest {
        let tx = conn.transaction()?;
        for migration in MIGRATIONS
            .iter()
            .filter(|migration| migration.version > from_version)
        {
            tx.execute_batch(migration.sql)?;
            tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
            debug!(
                "event=db_migrate module=db status=ok version={} name={}",
                migration.version, migration.name
            );
            applied.push(migration.name);
        }
        tx.commit()?;
        info!(
            "event=db_migrate module=db status=done from_version={} to_version={}",
            from_version, latest
        );
    }

    if !has_lesson_identity_key(conn)? {
        return Err(DbError::MissingIdentityConstraint);
    }

    Ok(MigrationReport {
        from_version,
        to_version: latest,
        applied,
    })
}

/// True when some unique index on `lessons` covers exactly the identity key.
fn has_lesson_identity_key(conn: &Connection) -> DbResult<bool> {
    let mut list = conn.prepare("SELECT name, \"unique\" FROM pragma_index_list('lessons');")?;
    let unique_indexes: Vec<String> = list
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .filter_map(|entry| match entry {
            Ok((name, 1)) => Some(Ok(name)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<Result<_, _>>()?;

    let mut expected = LESSON_IDENTITY_COLUMNS.to_vec();
    expected.sort_unstable();
    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1);")?;
    for index in unique_indexes {
        let mut columns: Vec<String> = info
            .query_map([&index], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;
        columns.sort_unstable();
        if columns == expected {
            return Ok(true);
        }
    }
    Ok(false)
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
