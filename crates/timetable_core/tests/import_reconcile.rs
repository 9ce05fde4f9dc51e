mod common;

use common::{date, seed_catalog};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use timetable_core::import::row::SourceRow;
use timetable_core::import::source::parse_spreadsheet;
use timetable_core::model::catalog::{
    Classroom, ClassroomId, Group, GroupId, ReferenceEntity, Subject, SubjectId, Teacher,
    TeacherId,
};
use timetable_core::model::lesson::ResourceSlot;
use timetable_core::repo::lesson_repo::BatchInsertReport;
use timetable_core::{
    open_db_in_memory, CancellationToken, Catalog, CatalogWriter, DateRange, EntityInsertReport,
    EntityKind, ImportService, Lesson, LessonId, LessonIdentity, LessonStore, RecordKind,
    ReconcileOptions, RepoResult, RowErrorKind, RowLocation, ScheduleReconciler, SqliteCatalog,
    SqliteLessonStore,
};
use zip::write::FileOptions;
use zip::ZipWriter;

fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn service(
    conn: &rusqlite::Connection,
) -> ImportService<SqliteCatalog<'_>, SqliteLessonStore<'_>> {
    ImportService::new(
        SqliteCatalog::new(conn),
        SqliteLessonStore::new(conn),
        ReconcileOptions::default(),
    )
}

const LESSONS: &str = "\u{feff}10.11.2025;ИС-21;1;Математика;Иванов И.И.;101

10.11.2025\tИС-22\t1\tФизика\tПетров П.П.\t202
2025-11-11,ИС-21,2,Физика,Петров П.П.,202
11.11.25;ИС-99;1;Математика;Иванов И.И.;101
10.11.2025;ИС-21;1;Физика;Петров П.П.;202
32.11.2025;ИС-21;3;Математика;Иванов И.И.;101
10.11.2025;ИС-21;4
10.11.2025;ИС-21;5;;Иванов И.И.;101
   
";

#[test]
fn lesson_text_import_reports_per_row() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed_catalog(&conn);
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "week.txt", LESSONS.as_bytes());

    let report = service(&conn).import_file(&path, RecordKind::Lesson, None);

    assert_eq!(report.kind, RecordKind::Lesson);
    assert_eq!(report.accepted, 3);
    assert_eq!(report.rejected, 5);
    assert!(!report.cancelled);

    let locations: Vec<_> = report.errors.iter().map(|error| error.location).collect();
    assert_eq!(
        locations,
        vec![
            Some(RowLocation::Line(5)),
            Some(RowLocation::Line(6)),
            Some(RowLocation::Line(7)),
            Some(RowLocation::Line(8)),
            Some(RowLocation::Line(9)),
        ]
    );
    assert_eq!(
        report.errors[0].kind,
        RowErrorKind::ReferenceNotFound {
            kind: EntityKind::Group,
            value: "ИС-99".to_string(),
        }
    );
    assert_eq!(
        report.errors[0].to_string(),
        "line 5: reference not found: group 'ИС-99'"
    );
    assert!(matches!(report.errors[1].kind, RowErrorKind::Duplicate { .. }));
    assert!(matches!(
        report.errors[2].kind,
        RowErrorKind::InvalidField { field: "date", .. }
    ));
    assert_eq!(
        report.errors[3].kind,
        RowErrorKind::MissingData {
            expected: 6,
            found: 3
        }
    );
    assert_eq!(
        report.errors[4].kind,
        RowErrorKind::EmptyField { field: "subject" }
    );

    let store = SqliteLessonStore::new(&conn);
    let stored = store
        .find_by_identity(&LessonIdentity {
            date: date(2025, 11, 10),
            group_id: fixture.group.id,
            lesson_number: 1,
        })
        .unwrap()
        .unwrap();
    assert_eq!(stored.subject_id, fixture.subject.id);
    assert_eq!(stored.teacher_id, fixture.teacher.id);
    assert_eq!(stored.classroom_id, fixture.room.id);
}

#[test]
fn reimporting_the_same_file_rejects_every_row_as_duplicate() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "week.csv",
        "10.11.2025;ИС-21;1;Математика;Иванов И.И.;101\n10.11.2025;ИС-21;2;Физика;Петров П.П.;202\n"
            .as_bytes(),
    );

    let first = service(&conn).import_file(&path, RecordKind::Lesson, None);
    assert_eq!((first.accepted, first.rejected), (2, 0));

    let second = service(&conn).import_file(&path, RecordKind::Lesson, None);
    assert_eq!((second.accepted, second.rejected), (0, 2));
    assert!(second
        .errors
        .iter()
        .all(|error| matches!(error.kind, RowErrorKind::Duplicate { .. })));

    let lessons = SqliteLessonStore::new(&conn)
        .query(DateRange::week_from(date(2025, 11, 10)), None)
        .unwrap();
    assert_eq!(lessons.len(), 2);
}

#[test]
fn reference_import_rejects_existing_and_repeated_keys() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "teachers.txt",
        "Сидорова Анна Павловна;Сидорова А.П.\n\
         Иванов Иван Иванович;Иванов И.\n\
         Кузнецов Олег Игоревич;Иванов И.И.\n\
         Сидорова Анна Павловна;Сидорова А.\n\
         Орлова Мария Сергеевна;Орлова М.С.\n"
            .as_bytes(),
    );

    let report = service(&conn).import_file(&path, RecordKind::Teacher, None);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 3);
    assert!(report
        .errors
        .iter()
        .all(|error| matches!(error.kind, RowErrorKind::Duplicate { .. })));

    let catalog = SqliteCatalog::new(&conn);
    assert!(catalog.teacher_by_short_name("Сидорова А.П.").unwrap().is_some());
    assert!(catalog.teacher_by_short_name("Орлова М.С.").unwrap().is_some());
    assert!(catalog.teacher_by_short_name("Сидорова А.").unwrap().is_none());
}

#[test]
fn classroom_and_group_rows_validate_integers() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let rows = vec![
        SourceRow::from_line(1, "303;40").unwrap(),
        SourceRow::from_line(2, "304;сорок").unwrap(),
        SourceRow::from_line(3, "101;30").unwrap(),
    ];
    let report = service(&conn).import_rows(RecordKind::Classroom, &rows, None);
    assert_eq!((report.accepted, report.rejected), (1, 2));
    assert!(matches!(
        report.errors[0].kind,
        RowErrorKind::InvalidField { field: "capacity", .. }
    ));
    assert!(matches!(report.errors[1].kind, RowErrorKind::Duplicate { .. }));

    let groups = vec![SourceRow::from_line(1, "ИС-31, 3").unwrap()];
    let report = service(&conn).import_rows(RecordKind::Group, &groups, None);
    assert_eq!(report.accepted, 1);
    assert_eq!(
        SqliteCatalog::new(&conn)
            .group_by_name("ИС-31")
            .unwrap()
            .unwrap()
            .year,
        3
    );
}

fn build_workbook(sheet_rows: &str, shared: &[&str]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();

    zip.start_file("xl/workbook.xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Week" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
    )
    .unwrap();

    zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#,
    )
    .unwrap();

    let items: String = shared
        .iter()
        .map(|value| format!("<si><t>{value}</t></si>"))
        .collect();
    zip.start_file("xl/sharedStrings.xml", options).unwrap();
    zip.write_all(format!("<sst count=\"{}\">{items}</sst>", shared.len()).as_bytes())
        .unwrap();

    zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
    zip.write_all(format!("<worksheet><sheetData>{sheet_rows}</sheetData></worksheet>").as_bytes())
        .unwrap();

    zip.finish().unwrap().into_inner()
}

fn lesson_workbook() -> Vec<u8> {
    // Shared strings: 0 Дата, 1 ИС-21, 2 Математика, 3 Иванов И.И., 4 Физика, 5 Петров П.П.
    let shared = ["Дата", "ИС-21", "Математика", "Иванов И.И.", "Физика", "Петров П.П."];
    let rows = r#"
<row r="1"><c r="A1" t="s"><v>0</v></c></row>
<row r="2"><c r="A2"><v>45971</v></c><c r="B2" t="s"><v>1</v></c><c r="C2"><v>1</v></c><c r="D2" t="s"><v>2</v></c><c r="E2" t="s"><v>3</v></c><c r="F2"><v>101</v></c></row>
<row r="3"/>
<row r="4"><c r="A4" t="inlineStr"><is><t>11.11.2025</t></is></c><c r="B4" t="s"><v>1</v></c><c r="C4"><v>2.0</v></c><c r="D4" t="s"><v>4</v></c><c r="E4" t="s"><v>5</v></c><c r="F4"><v>202</v></c></row>
<row r="5"><c r="B5" t="s"><v>1</v></c></row>
<row r="6"><c r="A6" t="inlineStr"><is><t>12.11.2025</t></is></c><c r="B6" t="s"><v>1</v></c><c r="C6"><v>1</v></c></row>
"#;
    build_workbook(rows, &shared)
}

#[test]
fn spreadsheet_rows_keep_sheet_numbers_and_skip_header() {
    let rows = parse_spreadsheet(Cursor::new(lesson_workbook())).unwrap();
    let locations: Vec<_> = rows.iter().map(|row| row.location).collect();
    assert_eq!(
        locations,
        vec![RowLocation::Row(2), RowLocation::Row(4), RowLocation::Row(6)]
    );
    assert_eq!(
        rows[0].fields,
        vec!["45971", "ИС-21", "1", "Математика", "Иванов И.И.", "101"]
    );
    assert_eq!(rows[2].fields, vec!["12.11.2025", "ИС-21", "1"]);
}

#[test]
fn spreadsheet_import_resolves_serial_dates() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed_catalog(&conn);
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "week.XLSX", &lesson_workbook());

    let report = service(&conn).import_file(&path, RecordKind::Lesson, None);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.errors[0].location, Some(RowLocation::Row(6)));
    assert_eq!(report.errors[0].to_string().split(':').next(), Some("row 6"));

    let lessons = SqliteLessonStore::new(&conn)
        .query(DateRange::week_from(date(2025, 11, 10)), Some(fixture.group.id))
        .unwrap();
    assert_eq!(lessons.len(), 2);
    assert_eq!(lessons[0].date, date(2025, 11, 10));
    assert_eq!(lessons[1].date, date(2025, 11, 11));
    assert_eq!(lessons[1].lesson_number, 2);
}

#[test]
fn unreadable_sources_yield_a_single_error() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let dir = tempfile::tempdir().unwrap();

    let missing = service(&conn).import_file(
        &dir.path().join("absent.txt"),
        RecordKind::Lesson,
        None,
    );
    assert!(missing.is_source_unreadable());
    assert_eq!((missing.accepted, missing.rejected), (0, 0));
    assert_eq!(missing.errors.len(), 1);
    assert_eq!(missing.errors[0].location, None);

    let corrupt_path = write_file(dir.path(), "broken.xlsx", b"definitely not a zip archive");
    let corrupt = service(&conn).import_file(&corrupt_path, RecordKind::Lesson, None);
    assert!(corrupt.is_source_unreadable());
    assert_eq!(corrupt.accepted, 0);
}

#[test]
fn pre_cancelled_import_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let rows =
        vec![SourceRow::from_line(1, "10.11.2025;ИС-21;1;Математика;Иванов И.И.;101").unwrap()];
    let token = CancellationToken::new();
    token.cancel();

    let report = service(&conn).import_rows(RecordKind::Lesson, &rows, Some(token));
    assert!(report.cancelled);
    assert_eq!((report.accepted, report.rejected), (0, 0));
    assert!(SqliteLessonStore::new(&conn)
        .query(DateRange::week_from(date(2025, 11, 10)), None)
        .unwrap()
        .is_empty());
}

/// Store that requests cancellation once its first batch is committed.
struct CancelAfterCommit<'conn> {
    inner: SqliteLessonStore<'conn>,
    token: CancellationToken,
}

impl LessonStore for CancelAfterCommit<'_> {
    fn find_by_identity(&self, identity: &LessonIdentity) -> RepoResult<Option<Lesson>> {
        self.inner.find_by_identity(identity)
    }

    fn find_conflicting(
        &self,
        slot: &ResourceSlot,
        exclude: Option<LessonId>,
    ) -> RepoResult<Vec<Lesson>> {
        self.inner.find_conflicting(slot, exclude)
    }

    fn insert_batch(&self, lessons: &[Lesson]) -> RepoResult<BatchInsertReport> {
        let report = self.inner.insert_batch(lessons)?;
        self.token.cancel();
        Ok(report)
    }

    fn query(
        &self,
        range: DateRange,
        group_id: Option<GroupId>,
    ) -> RepoResult<Vec<Lesson>> {
        self.inner.query(range, group_id)
    }
}

#[test]
fn cancellation_keeps_committed_batches_only() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let rows: Vec<SourceRow> = (1..=5)
        .map(|number| {
            SourceRow::from_line(
                number,
                &format!("12.11.2025;ИС-21;{number};Математика;Иванов И.И.;101"),
            )
            .unwrap()
        })
        .collect();

    let token = CancellationToken::new();
    let store = CancelAfterCommit {
        inner: SqliteLessonStore::new(&conn),
        token: token.clone(),
    };
    let catalog = SqliteCatalog::new(&conn);
    let options = ReconcileOptions {
        batch_size: 2,
        ..ReconcileOptions::default()
    };
    let report = ScheduleReconciler::new(&catalog, &store, options)
        .with_cancellation(token)
        .reconcile(RecordKind::Lesson, &rows);

    assert!(report.cancelled);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 0);

    let stored = SqliteLessonStore::new(&conn)
        .query(DateRange::week_from(date(2025, 11, 10)), None)
        .unwrap();
    assert_eq!(
        stored
            .iter()
            .map(|lesson| lesson.lesson_number)
            .collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[test]
fn lessons_per_day_limit_applies_to_rows() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let rows = vec![
        SourceRow::from_line(1, "10.11.2025;ИС-21;6;Математика;Иванов И.И.;101").unwrap(),
        SourceRow::from_line(2, "10.11.2025;ИС-21;7;Математика;Иванов И.И.;101").unwrap(),
    ];
    let import = ImportService::new(
        SqliteCatalog::new(&conn),
        SqliteLessonStore::new(&conn),
        ReconcileOptions {
            batch_size: 10,
            max_lesson_number: 6,
        },
    );
    let report = import.import_rows(RecordKind::Lesson, &rows, None);
    assert_eq!((report.accepted, report.rejected), (1, 1));
    assert_eq!(report.errors[0].location, Some(RowLocation::Line(2)));
}

#[test]
fn report_serializes_for_callers() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let rows = vec![
        SourceRow::from_line(3, "Химия").unwrap(),
        SourceRow::from_line(4, "Физика").unwrap(),
    ];
    let report = service(&conn).import_rows(RecordKind::Subject, &rows, None);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["kind"], "subject");
    assert_eq!(json["accepted"], 1);
    assert_eq!(json["rejected"], 1);
    assert_eq!(json["errors"][0]["location"]["type"], "line");
    assert_eq!(json["errors"][0]["location"]["number"], 4);
    assert_eq!(json["errors"][0]["kind"]["type"], "duplicate");
}

/// Lesson store whose identity lookups miss rows another writer just added.
struct StaleIdentityLookup<'conn> {
    inner: SqliteLessonStore<'conn>,
}

impl LessonStore for StaleIdentityLookup<'_> {
    fn find_by_identity(&self, _identity: &LessonIdentity) -> RepoResult<Option<Lesson>> {
        Ok(None)
    }

    fn find_conflicting(
        &self,
        slot: &ResourceSlot,
        exclude: Option<LessonId>,
    ) -> RepoResult<Vec<Lesson>> {
        self.inner.find_conflicting(slot, exclude)
    }

    fn insert_batch(&self, lessons: &[Lesson]) -> RepoResult<BatchInsertReport> {
        self.inner.insert_batch(lessons)
    }

    fn query(&self, range: DateRange, group_id: Option<GroupId>) -> RepoResult<Vec<Lesson>> {
        self.inner.query(range, group_id)
    }
}

#[test]
fn lesson_taken_at_commit_becomes_row_duplicate() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let first = vec![
        SourceRow::from_line(1, "10.11.2025;ИС-21;1;Математика;Иванов И.И.;101").unwrap(),
    ];
    let report = service(&conn).import_rows(RecordKind::Lesson, &first, None);
    assert_eq!((report.accepted, report.rejected), (1, 0));

    let rows = vec![
        SourceRow::from_line(1, "10.11.2025;ИС-21;1;Физика;Петров П.П.;202").unwrap(),
        SourceRow::from_line(2, "10.11.2025;ИС-21;2;Физика;Петров П.П.;202").unwrap(),
    ];
    let store = StaleIdentityLookup {
        inner: SqliteLessonStore::new(&conn),
    };
    let catalog = SqliteCatalog::new(&conn);
    let report = ScheduleReconciler::new(&catalog, &store, ReconcileOptions::default())
        .reconcile(RecordKind::Lesson, &rows);

    assert_eq!((report.accepted, report.rejected), (1, 1));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].location, Some(RowLocation::Line(1)));
    match &report.errors[0].kind {
        RowErrorKind::Duplicate { detail } => {
            assert!(detail.contains("10.11.2025"), "detail: {detail}")
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let stored = SqliteLessonStore::new(&conn)
        .query(DateRange::new(date(2025, 11, 10), date(2025, 11, 10)), None)
        .unwrap();
    assert_eq!(stored.len(), 2);
}

/// Catalog that never sees subjects by name, as if they were added after
/// the row was checked.
struct StaleSubjectLookup<'conn> {
    inner: SqliteCatalog<'conn>,
}

impl Catalog for StaleSubjectLookup<'_> {
    fn group(&self, id: GroupId) -> RepoResult<Option<Group>> {
        self.inner.group(id)
    }

    fn subject(&self, id: SubjectId) -> RepoResult<Option<Subject>> {
        self.inner.subject(id)
    }

    fn teacher(&self, id: TeacherId) -> RepoResult<Option<Teacher>> {
        self.inner.teacher(id)
    }

    fn classroom(&self, id: ClassroomId) -> RepoResult<Option<Classroom>> {
        self.inner.classroom(id)
    }

    fn group_by_name(&self, name: &str) -> RepoResult<Option<Group>> {
        self.inner.group_by_name(name)
    }

    fn subject_by_name(&self, _name: &str) -> RepoResult<Option<Subject>> {
        Ok(None)
    }

    fn teacher_by_short_name(&self, short_name: &str) -> RepoResult<Option<Teacher>> {
        self.inner.teacher_by_short_name(short_name)
    }

    fn teacher_by_full_name(&self, full_name: &str) -> RepoResult<Option<Teacher>> {
        self.inner.teacher_by_full_name(full_name)
    }

    fn classroom_by_name(&self, name: &str) -> RepoResult<Option<Classroom>> {
        self.inner.classroom_by_name(name)
    }

    fn list_groups(&self) -> RepoResult<Vec<Group>> {
        self.inner.list_groups()
    }
}

impl CatalogWriter for StaleSubjectLookup<'_> {
    fn insert_entities(&self, entities: &[ReferenceEntity]) -> RepoResult<EntityInsertReport> {
        self.inner.insert_entities(entities)
    }
}

#[test]
fn entity_taken_at_commit_rejects_only_its_row() {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let rows = vec![
        SourceRow::from_line(1, "Химия").unwrap(),
        SourceRow::from_line(2, "Физика").unwrap(),
        SourceRow::from_line(3, "Биология").unwrap(),
    ];
    let catalog = StaleSubjectLookup {
        inner: SqliteCatalog::new(&conn),
    };
    let store = SqliteLessonStore::new(&conn);
    let report = ScheduleReconciler::new(&catalog, &store, ReconcileOptions::default())
        .reconcile(RecordKind::Subject, &rows);

    assert_eq!((report.accepted, report.rejected), (2, 1));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].location, Some(RowLocation::Line(2)));
    match &report.errors[0].kind {
        RowErrorKind::Duplicate { detail } => {
            assert!(detail.contains("Физика"), "detail: {detail}");
            assert!(!detail.contains("Химия"), "detail: {detail}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let stored = SqliteCatalog::new(&conn);
    assert!(stored.subject_by_name("Химия").unwrap().is_some());
    assert!(stored.subject_by_name("Биология").unwrap().is_some());
}
