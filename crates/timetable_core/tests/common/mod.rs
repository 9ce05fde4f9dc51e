#![allow(dead_code)]

use chrono::NaiveDate;
use rusqlite::Connection;
use timetable_core::{
    CatalogWriter, Classroom, Group, ReferenceEntity, SqliteCatalog, Subject, Teacher,
};

/// Reference entities seeded into a fresh database.
pub struct Fixture {
    pub group: Group,
    pub other_group: Group,
    pub subject: Subject,
    pub other_subject: Subject,
    pub teacher: Teacher,
    pub other_teacher: Teacher,
    pub room: Classroom,
    pub other_room: Classroom,
}

pub fn seed_catalog(conn: &Connection) -> Fixture {
    let fixture = Fixture {
        group: Group::new("ИС-21", 2),
        other_group: Group::new("ИС-22", 2),
        subject: Subject::new("Математика"),
        other_subject: Subject::new("Физика"),
        teacher: Teacher::new("Иванов Иван Иванович", "Иванов И.И."),
        other_teacher: Teacher::new("Петров Пётр Петрович", "Петров П.П."),
        room: Classroom::new("101", 30),
        other_room: Classroom::new("202", 25),
    };
    let entities = vec![
        ReferenceEntity::Group(fixture.group.clone()),
        ReferenceEntity::Group(fixture.other_group.clone()),
        ReferenceEntity::Subject(fixture.subject.clone()),
        ReferenceEntity::Subject(fixture.other_subject.clone()),
        ReferenceEntity::Teacher(fixture.teacher.clone()),
        ReferenceEntity::Teacher(fixture.other_teacher.clone()),
        ReferenceEntity::Classroom(fixture.room.clone()),
        ReferenceEntity::Classroom(fixture.other_room.clone()),
    ];
    SqliteCatalog::new(conn).insert_entities(&entities).unwrap();
    fixture
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
