//! Row-by-row reconciliation against the catalog and the lesson store.
//!
//! # Responsibility
//! - Resolve natural keys of parsed rows and reject duplicates.
//! - Stage accepted records and commit them in batches.
//! - Honor cooperative cancellation at row granularity.
//!
//! # Invariants
//! - A row is counted as accepted only after its batch is committed.
//! - A cancelled run never commits the batch that was staged when the
//!   cancellation was observed.
//! - Errors in the returned report are ordered by source position.

use crate::import::record::{parse_record, LessonRow, ParsedRecord, RecordKind};
use crate::import::report::{ImportReport, RowErrorKind, RowLocation};
use crate::import::row::SourceRow;
use crate::import::source::read_source;
use crate::model::catalog::{EntityKind, ReferenceEntity};
use crate::model::lesson::{Lesson, LessonIdentity, MAX_LESSON_NUMBER};
use crate::repo::catalog_repo::{Catalog, CatalogWriter};
use crate::repo::lesson_repo::LessonStore;
use log::{info, warn};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Accepted rows staged before an intermediate commit.
    pub batch_size: usize,
    /// Highest lesson number a lesson row may carry.
    pub max_lesson_number: u8,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_lesson_number: MAX_LESSON_NUMBER,
        }
    }
}

/// Shared flag a caller flips to stop a running import.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reconciles import rows of one record kind into storage.
pub struct ScheduleReconciler<'a, C, S> {
    catalog: &'a C,
    store: &'a S,
    options: ReconcileOptions,
    cancellation: CancellationToken,
}

/// Records staged since the last commit plus the keys seen during the run.
#[derive(Default)]
struct RunState {
    lessons: Vec<(RowLocation, Lesson)>,
    entities: Vec<(RowLocation, ReferenceEntity)>,
    seen_identities: HashSet<LessonIdentity>,
    seen_keys: HashSet<(EntityKind, String)>,
    seen_teacher_full_names: HashSet<String>,
}

impl RunState {
    fn pending(&self) -> usize {
        self.lessons.len() + self.entities.len()
    }
}

impl<'a, C, S> ScheduleReconciler<'a, C, S>
where
    C: Catalog + CatalogWriter,
    S: LessonStore,
{
    pub fn new(catalog: &'a C, store: &'a S, options: ReconcileOptions) -> Self {
        Self {
            catalog,
            store,
            options: ReconcileOptions {
                batch_size: options.batch_size.max(1),
                ..options
            },
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Reads `path` and reconciles its rows.
    ///
    /// An unreadable source yields a report holding a single
    /// `SourceUnreadable` error.
    pub fn reconcile_path(&self, kind: RecordKind, path: &Path) -> ImportReport {
        match read_source(path) {
            Ok(rows) => self.reconcile(kind, &rows),
            Err(err) => {
                warn!(
                    "event=import_run module=import status=error kind={} error_code=source_unreadable error={}",
                    kind, err
                );
                ImportReport::unreadable(kind, err.to_string())
            }
        }
    }

    /// Reconciles already-read rows. Never fails; problems are reported per row.
    pub fn reconcile(&self, kind: RecordKind, rows: &[SourceRow]) -> ImportReport {
        let started_at = Instant::now();
        info!(
            "event=import_run module=import status=start kind={} rows={}",
            kind,
            rows.len()
        );

        let mut report = ImportReport::new(kind);
        let mut run = RunState::default();

        for row in rows {
            if self.cancellation.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if let Err(error) = self.stage_row(kind, row, &mut run) {
                report.reject(row.location, error);
            }
            if run.pending() >= self.options.batch_size {
                self.commit(&mut run, &mut report);
            }
        }

        if !report.cancelled {
            self.commit(&mut run, &mut report);
        }
        report.errors.sort_by_key(|error| error.location);

        info!(
            "event=import_run module=import status=ok kind={} accepted={} rejected={} cancelled={} duration_ms={}",
            kind,
            report.accepted,
            report.rejected,
            report.cancelled,
            started_at.elapsed().as_millis()
        );
        report
    }

    fn stage_row(
        &self,
        kind: RecordKind,
        row: &SourceRow,
        run: &mut RunState,
    ) -> Result<(), RowErrorKind> {
        let record = parse_record(
            kind,
            &row.fields,
            row.location,
            self.options.max_lesson_number,
        )?;
        match record {
            ParsedRecord::Lesson(lesson_row) => {
                let lesson = self.resolve_lesson(&lesson_row)?;
                self.check_lesson_identity(&lesson, run)?;
                run.seen_identities.insert(lesson.identity());
                run.lessons.push((row.location, lesson));
            }
            ParsedRecord::Teacher(teacher) => {
                let entity = ReferenceEntity::Teacher(teacher);
                self.check_natural_key(&entity, run)?;
                if let ReferenceEntity::Teacher(teacher) = &entity {
                    run.seen_teacher_full_names.insert(teacher.full_name.clone());
                }
                self.stage_entity(row.location, entity, run);
            }
            ParsedRecord::Classroom(classroom) => {
                let entity = ReferenceEntity::Classroom(classroom);
                self.check_natural_key(&entity, run)?;
                self.stage_entity(row.location, entity, run);
            }
            ParsedRecord::Subject(subject) => {
                let entity = ReferenceEntity::Subject(subject);
                self.check_natural_key(&entity, run)?;
                self.stage_entity(row.location, entity, run);
            }
            ParsedRecord::Group(group) => {
                let entity = ReferenceEntity::Group(group);
                self.check_natural_key(&entity, run)?;
                self.stage_entity(row.location, entity, run);
            }
        }
        Ok(())
    }

    fn resolve_lesson(&self, row: &LessonRow) -> Result<Lesson, RowErrorKind> {
        let group = self
            .catalog
            .group_by_name(&row.group_name)
            .map_err(storage_error)?
            .ok_or_else(|| not_found(EntityKind::Group, &row.group_name))?;
        let subject = self
            .catalog
            .subject_by_name(&row.subject_name)
            .map_err(storage_error)?
            .ok_or_else(|| not_found(EntityKind::Subject, &row.subject_name))?;
        let teacher = self
            .catalog
            .teacher_by_short_name(&row.teacher_short_name)
            .map_err(storage_error)?
            .ok_or_else(|| not_found(EntityKind::Teacher, &row.teacher_short_name))?;
        let classroom = self
            .catalog
            .classroom_by_name(&row.classroom_name)
            .map_err(storage_error)?
            .ok_or_else(|| not_found(EntityKind::Classroom, &row.classroom_name))?;

        Ok(Lesson::new(
            row.date,
            row.lesson_number,
            group.id,
            subject.id,
            teacher.id,
            classroom.id,
        ))
    }

    fn check_lesson_identity(&self, lesson: &Lesson, run: &RunState) -> Result<(), RowErrorKind> {
        let identity = lesson.identity();
        if run.seen_identities.contains(&identity) {
            return Err(duplicate_lesson(&identity, "earlier in this import"));
        }
        if self
            .store
            .find_by_identity(&identity)
            .map_err(storage_error)?
            .is_some()
        {
            return Err(duplicate_lesson(&identity, "in the schedule"));
        }
        Ok(())
    }

    fn check_natural_key(
        &self,
        entity: &ReferenceEntity,
        run: &RunState,
    ) -> Result<(), RowErrorKind> {
        let kind = entity.kind();
        let key = entity.natural_key();
        let duplicate = |detail: String| RowErrorKind::Duplicate { detail };

        if run.seen_keys.contains(&(kind, key.to_string())) {
            return Err(duplicate(format!(
                "{kind} '{key}' appears earlier in this import"
            )));
        }

        let exists = match entity {
            ReferenceEntity::Group(group) => self
                .catalog
                .group_by_name(&group.name)
                .map(|found| found.is_some()),
            ReferenceEntity::Subject(subject) => self
                .catalog
                .subject_by_name(&subject.name)
                .map(|found| found.is_some()),
            ReferenceEntity::Classroom(classroom) => self
                .catalog
                .classroom_by_name(&classroom.name)
                .map(|found| found.is_some()),
            ReferenceEntity::Teacher(teacher) => {
                if run.seen_teacher_full_names.contains(&teacher.full_name) {
                    return Err(duplicate(format!(
                        "teacher '{}' appears earlier in this import",
                        teacher.full_name
                    )));
                }
                if self
                    .catalog
                    .teacher_by_full_name(&teacher.full_name)
                    .map_err(storage_error)?
                    .is_some()
                {
                    return Err(duplicate(format!(
                        "teacher '{}' already exists",
                        teacher.full_name
                    )));
                }
                self.catalog
                    .teacher_by_short_name(&teacher.short_name)
                    .map(|found| found.is_some())
            }
        }
        .map_err(storage_error)?;

        if exists {
            return Err(duplicate(format!("{kind} '{key}' already exists")));
        }
        Ok(())
    }

    fn stage_entity(&self, location: RowLocation, entity: ReferenceEntity, run: &mut RunState) {
        run.seen_keys
            .insert((entity.kind(), entity.natural_key().to_string()));
        run.entities.push((location, entity));
    }

    /// Writes the staged batch and settles its rows in the report.
    fn commit(&self, run: &mut RunState, report: &mut ImportReport) {
        let lessons = std::mem::take(&mut run.lessons);
        if !lessons.is_empty() {
            let batch: Vec<Lesson> = lessons.iter().map(|(_, lesson)| lesson.clone()).collect();
            match self.store.insert_batch(&batch) {
                Ok(outcome) => {
                    let skipped: HashSet<LessonIdentity> = outcome.skipped.into_iter().collect();
                    for (location, lesson) in lessons {
                        let identity = lesson.identity();
                        if skipped.contains(&identity) {
                            report.reject(location, duplicate_lesson(&identity, "in the schedule"));
                        } else {
                            report.accepted += 1;
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "event=import_commit module=import status=error rows={} error={}",
                        lessons.len(),
                        err
                    );
                    for (location, _) in lessons {
                        report.reject(location, storage_error(&err));
                    }
                }
            }
        }

        let entities = std::mem::take(&mut run.entities);
        if !entities.is_empty() {
            let batch: Vec<ReferenceEntity> =
                entities.iter().map(|(_, entity)| entity.clone()).collect();
            match self.catalog.insert_entities(&batch) {
                Ok(outcome) => {
                    let skipped: HashSet<(EntityKind, String)> =
                        outcome.skipped.into_iter().collect();
                    for (location, entity) in entities {
                        let kind = entity.kind();
                        let key = entity.natural_key().to_string();
                        if skipped.contains(&(kind, key.clone())) {
                            report.reject(
                                location,
                                RowErrorKind::Duplicate {
                                    detail: format!("{kind} '{key}' already exists"),
                                },
                            );
                        } else {
                            report.accepted += 1;
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "event=import_commit module=import status=error rows={} error={}",
                        entities.len(),
                        err
                    );
                    for (location, _) in entities {
                        report.reject(location, storage_error(&err));
                    }
                }
            }
        }
    }
}

fn storage_error(err: impl std::fmt::Display) -> RowErrorKind {
    RowErrorKind::Storage {
        message: err.to_string(),
    }
}

fn not_found(kind: EntityKind, value: &str) -> RowErrorKind {
    RowErrorKind::ReferenceNotFound {
        kind,
        value: value.to_string(),
    }
}

fn duplicate_lesson(identity: &LessonIdentity, place: &str) -> RowErrorKind {
    RowErrorKind::Duplicate {
        detail: format!(
            "lesson {} on {} already exists {place}",
            identity.lesson_number,
            identity.date.format("%d.%m.%Y")
        ),
    }
}
