//! Core domain logic for the timetable engine.
//! This crate is the single source of truth for scheduling invariants.

pub mod config;
pub mod db;
pub mod import;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use config::{load_config, ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use import::reconciler::{CancellationToken, ReconcileOptions, ScheduleReconciler};
pub use import::record::RecordKind;
pub use import::report::{ImportReport, RowError, RowErrorKind, RowLocation};
pub use logging::{init_from_config, init_logging, logging_status, LoggingError};
pub use model::catalog::{Classroom, EntityKind, Group, ReferenceEntity, Subject, Teacher};
pub use model::lesson::{Lesson, LessonId, LessonIdentity, LessonValidationError};
pub use model::template::WeeklyTemplate;
pub use repo::catalog_repo::{Catalog, CatalogWriter, EntityInsertReport, SqliteCatalog};
pub use repo::lesson_repo::{
    DateRange, LessonEditStore, LessonStore, RepoError, RepoResult, SqliteLessonStore,
};
pub use repo::template_repo::{SqliteTemplateRepository, TemplateRepository};
pub use schedule::conflict::{find_all_conflicts, find_conflicts, ConflictPair, SharedResource};
pub use schedule::expander::TemplateExpander;
pub use schedule::parity::{is_even_week, week_start, ParityRule};
pub use service::export_service::{ExportError, ExportService};
pub use service::import_service::ImportService;
pub use service::lesson_service::{ConflictPolicy, LessonService, LessonServiceError};
pub use service::schedule_service::{GenerationReport, ScheduleService, WeekSchedule};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
