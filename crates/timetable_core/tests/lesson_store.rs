mod common;

use common::{date, seed_catalog, Fixture};
use timetable_core::model::lesson::ResourceSlot;
use timetable_core::{
    open_db_in_memory, DateRange, Lesson, LessonEditStore, LessonStore, RepoError,
    SqliteLessonStore,
};

fn lesson(fixture: &Fixture, day: u32, number: u8) -> Lesson {
    Lesson::new(
        date(2025, 11, day),
        number,
        fixture.group.id,
        fixture.subject.id,
        fixture.teacher.id,
        fixture.room.id,
    )
}

#[test]
fn insert_batch_skips_taken_identities() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed_catalog(&conn);
    let store = SqliteLessonStore::new(&conn);

    let first = lesson(&fixture, 10, 1);
    let report = store.insert_batch(&[first.clone()]).unwrap();
    assert_eq!(report.inserted, 1);
    assert!(report.skipped.is_empty());

    let clash = lesson(&fixture, 10, 1);
    let fresh = lesson(&fixture, 10, 2);
    let report = store.insert_batch(&[clash.clone(), fresh]).unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.skipped, vec![clash.identity()]);

    let stored = store.find_by_identity(&first.identity()).unwrap().unwrap();
    assert_eq!(stored.id, first.id);
}

#[test]
fn insert_batch_rejects_invalid_lessons_before_writing() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed_catalog(&conn);
    let store = SqliteLessonStore::new(&conn);

    let valid = lesson(&fixture, 10, 1);
    let invalid = lesson(&fixture, 10, 9);
    let err = store.insert_batch(&[valid.clone(), invalid]).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(store.find_by_identity(&valid.identity()).unwrap().is_none());
}

#[test]
fn find_conflicting_matches_teacher_or_room_and_honors_exclude() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed_catalog(&conn);
    let store = SqliteLessonStore::new(&conn);

    let base = lesson(&fixture, 10, 3);
    let mut same_room = Lesson::new(
        date(2025, 11, 10),
        3,
        fixture.other_group.id,
        fixture.other_subject.id,
        fixture.other_teacher.id,
        fixture.room.id,
    );
    same_room.note = Some("лабораторная".to_string());
    let other_period = lesson(&fixture, 10, 4);
    store
        .insert_batch(&[base.clone(), same_room.clone(), other_period])
        .unwrap();

    let candidate = ResourceSlot {
        date: date(2025, 11, 10),
        lesson_number: 3,
        teacher_id: fixture.teacher.id,
        classroom_id: fixture.other_room.id,
    };
    let hits = store.find_conflicting(&candidate, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, base.id);

    let by_room = store.find_conflicting(&base.slot(), Some(base.id)).unwrap();
    assert_eq!(by_room.len(), 1);
    assert_eq!(by_room[0].id, same_room.id);
    assert_eq!(by_room[0].note.as_deref(), Some("лабораторная"));
}

#[test]
fn query_filters_by_range_and_group_in_order() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed_catalog(&conn);
    let store = SqliteLessonStore::new(&conn);

    let late = lesson(&fixture, 11, 2);
    let early = lesson(&fixture, 11, 1);
    let outside = lesson(&fixture, 20, 1);
    let other_group = Lesson::new(
        date(2025, 11, 10),
        1,
        fixture.other_group.id,
        fixture.other_subject.id,
        fixture.other_teacher.id,
        fixture.other_room.id,
    );
    store
        .insert_batch(&[late.clone(), early.clone(), outside, other_group.clone()])
        .unwrap();

    let range = DateRange::week_from(date(2025, 11, 10));
    let all: Vec<_> = store
        .query(range, None)
        .unwrap()
        .into_iter()
        .map(|lesson| lesson.id)
        .collect();
    assert_eq!(all, vec![other_group.id, early.id, late.id]);

    let mine: Vec<_> = store
        .query(range, Some(fixture.group.id))
        .unwrap()
        .into_iter()
        .map(|lesson| lesson.id)
        .collect();
    assert_eq!(mine, vec![early.id, late.id]);

    let inverted = DateRange::new(date(2025, 11, 16), date(2025, 11, 10));
    assert!(store.query(inverted, None).unwrap().is_empty());
}

#[test]
fn edits_keep_identity_unique() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed_catalog(&conn);
    let store = SqliteLessonStore::new(&conn);

    let first = lesson(&fixture, 12, 1);
    let second = lesson(&fixture, 12, 2);
    store.insert_lesson(&first).unwrap();
    store.insert_lesson(&second).unwrap();

    assert!(matches!(
        store.insert_lesson(&lesson(&fixture, 12, 1)),
        Err(RepoError::DuplicateIdentity(_))
    ));

    let mut moved = second.clone();
    moved.lesson_number = 1;
    assert!(matches!(
        store.update_lesson(&moved),
        Err(RepoError::DuplicateIdentity(_))
    ));

    let mut reassigned = second.clone();
    reassigned.classroom_id = fixture.other_room.id;
    reassigned.note = Some("замена аудитории".to_string());
    store.update_lesson(&reassigned).unwrap();
    assert_eq!(store.get_lesson(second.id).unwrap(), Some(reassigned));

    store.delete_lesson(first.id).unwrap();
    assert!(store.get_lesson(first.id).unwrap().is_none());
    assert!(matches!(
        store.delete_lesson(first.id),
        Err(RepoError::NotFound(id)) if id == first.id
    ));
}

#[test]
fn update_of_missing_lesson_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let fixture = seed_catalog(&conn);
    let store = SqliteLessonStore::new(&conn);

    let ghost = lesson(&fixture, 13, 1);
    assert!(matches!(
        store.update_lesson(&ghost),
        Err(RepoError::NotFound(id)) if id == ghost.id
    ));
}
