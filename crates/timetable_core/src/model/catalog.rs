//! Reference entities resolved by natural key during reconciliation.
//!
//! # Responsibility
//! - Define groups, subjects, teachers and classrooms as seen by the core.
//! - Name the natural key of each kind.
//!
//! # Invariants
//! - Natural keys are unique among entities of the same kind.
//! - Teachers resolve by `short_name`; every other kind resolves by `name`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type GroupId = Uuid;
pub type SubjectId = Uuid;
pub type TeacherId = Uuid;
pub type ClassroomId = Uuid;

/// Study group (class) attending lessons together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Course year of study.
    pub year: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub full_name: String,
    /// Abbreviated name used in timetables and import rows, e.g. `Иванов И.И.`.
    pub short_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    pub id: ClassroomId,
    pub name: String,
    pub capacity: u32,
}

impl Group {
    pub fn new(name: impl Into<String>, year: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            year,
        }
    }
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

impl Teacher {
    pub fn new(full_name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            short_name: short_name.into(),
        }
    }
}

impl Classroom {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            capacity,
        }
    }
}

/// Kind discriminator for reference entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Group,
    Subject,
    Teacher,
    Classroom,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Subject => "subject",
            Self::Teacher => "teacher",
            Self::Classroom => "classroom",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Any reference entity, used for batched catalog writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceEntity {
    Group(Group),
    Subject(Subject),
    Teacher(Teacher),
    Classroom(Classroom),
}

impl ReferenceEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Group(_) => EntityKind::Group,
            Self::Subject(_) => EntityKind::Subject,
            Self::Teacher(_) => EntityKind::Teacher,
            Self::Classroom(_) => EntityKind::Classroom,
        }
    }

    /// Returns the key other records use to refer to this entity.
    pub fn natural_key(&self) -> &str {
        match self {
            Self::Group(group) => group.name.as_str(),
            Self::Subject(subject) => subject.name.as_str(),
            Self::Teacher(teacher) => teacher.short_name.as_str(),
            Self::Classroom(classroom) => classroom.name.as_str(),
        }
    }
}
