use chrono::{NaiveDate, NaiveTime};
use proptest::prelude::*;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tutordesk_core::db::open_db_in_memory;
use tutordesk_core::{
    ChangeEntity, ChangeEvent, ChangeObserver, ChangeOp, CoreConfig, NewSessionRequest,
    SchedulingError, Session, SessionPatch, SessionStatus, SessionStore, SessionValidationError,
    SlotCalendar, SqliteSessionStore, StoreError,
};
use uuid::Uuid;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn calendar(conn: &Connection, max_per_slot: usize) -> SlotCalendar<SqliteSessionStore<'_>> {
    let config = CoreConfig {
        max_per_slot,
        ..CoreConfig::default()
    };
    SlotCalendar::try_new(SqliteSessionStore::new(conn), config).unwrap()
}

fn request(start: NaiveTime, end: NaiveTime) -> NewSessionRequest {
    NewSessionRequest {
        day: day(),
        student_id: Uuid::new_v4(),
        start,
        end,
        title: "Math".to_string(),
    }
}

#[test]
fn boundary_crossing_session_occupies_both_buckets_until_deleted() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 10);

    let id = calendar.create_session(&request(hm(16, 30), hm(17, 30))).unwrap();
    assert_eq!(calendar.occupancy(day(), hm(16, 0)).unwrap(), 1);
    assert_eq!(calendar.occupancy(day(), hm(17, 0)).unwrap(), 1);
    assert_eq!(calendar.occupancy(day(), hm(18, 0)).unwrap(), 0);

    calendar.delete_session(id).unwrap();
    assert_eq!(calendar.occupancy(day(), hm(16, 0)).unwrap(), 0);
    assert_eq!(calendar.occupancy(day(), hm(17, 0)).unwrap(), 0);
}

#[test]
fn create_fails_when_any_overlapped_bucket_is_full() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 2);

    calendar.create_session(&request(hm(17, 0), hm(18, 0))).unwrap();
    calendar.create_session(&request(hm(17, 0), hm(18, 0))).unwrap();

    let err = calendar
        .create_session(&request(hm(16, 30), hm(17, 30)))
        .unwrap_err();
    match err {
        SchedulingError::CapacityExceeded { bucket, capacity } => {
            assert_eq!(bucket.start_time(), hm(17, 0));
            assert_eq!(capacity, 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    calendar.create_session(&request(hm(16, 0), hm(17, 0))).unwrap();
    assert_eq!(calendar.sessions_in_slot(day(), hm(17, 0)).unwrap().len(), 2);
}

#[test]
fn create_rejects_intervals_outside_operating_window() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 10);

    let early = calendar
        .create_session(&request(hm(15, 0), hm(16, 0)))
        .unwrap_err();
    assert!(matches!(
        early,
        SchedulingError::Validation(SessionValidationError::OutsideOperatingWindow { .. })
    ));

    let late = calendar
        .create_session(&request(hm(21, 30), hm(22, 30)))
        .unwrap_err();
    assert!(matches!(late, SchedulingError::Validation(_)));

    let empty = calendar
        .create_session(&request(hm(18, 0), hm(18, 0)))
        .unwrap_err();
    assert!(matches!(
        empty,
        SchedulingError::Validation(SessionValidationError::InvalidRange { .. })
    ));

    calendar.create_session(&request(hm(21, 0), hm(22, 0))).unwrap();
}

#[test]
fn sub_second_times_are_stored_as_whole_seconds() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 10);
    let start = NaiveTime::from_hms_milli_opt(17, 0, 0, 250).unwrap();
    let end = NaiveTime::from_hms_milli_opt(18, 0, 0, 750).unwrap();

    let id = calendar.create_session(&request(start, end)).unwrap();
    let stored = calendar.store().get(id).unwrap().unwrap();
    assert_eq!(stored.start, day().and_time(hm(17, 0)));
    assert_eq!(stored.end, day().and_time(hm(18, 0)));

    let moved = calendar
        .update_session(
            id,
            &SessionPatch {
                day: day(),
                start: NaiveTime::from_hms_milli_opt(19, 0, 0, 999).unwrap(),
                end: hm(20, 0),
                student_id: None,
                title: None,
            },
        )
        .unwrap();
    assert_eq!(calendar.store().get(id).unwrap().unwrap(), moved);
    assert_eq!(moved.start, day().and_time(hm(19, 0)));
}

#[test]
fn interval_shorter_than_one_second_is_a_validation_error() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 10);
    let start = NaiveTime::from_hms_milli_opt(17, 0, 0, 100).unwrap();
    let end = NaiveTime::from_hms_milli_opt(17, 0, 0, 900).unwrap();

    let err = calendar.create_session(&request(start, end)).unwrap_err();
    assert!(matches!(
        err,
        SchedulingError::Validation(SessionValidationError::InvalidRange { .. })
    ));
}

#[test]
fn store_rejects_sessions_with_sub_second_timestamps() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteSessionStore::new(&conn);
    let session = Session::new(
        Uuid::new_v4(),
        day().and_time(NaiveTime::from_hms_milli_opt(17, 0, 0, 500).unwrap()),
        day().and_time(hm(18, 0)),
        "Math",
    );

    let err = store.create(&session).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
    assert!(store.get(session.id).unwrap().is_none());
}

#[test]
fn update_into_full_bucket_fails_and_keeps_original() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 1);

    calendar.create_session(&request(hm(19, 0), hm(20, 0))).unwrap();
    let id = calendar.create_session(&request(hm(17, 0), hm(18, 0))).unwrap();
    let before = calendar.store().get(id).unwrap().unwrap();

    let err = calendar
        .update_session(
            id,
            &SessionPatch {
                day: day(),
                start: hm(19, 30),
                end: hm(20, 30),
                student_id: None,
                title: Some("Moved".to_string()),
            },
        )
        .unwrap_err();
    assert!(matches!(err, SchedulingError::CapacityExceeded { .. }));

    let after = calendar.store().get(id).unwrap().unwrap();
    assert_eq!(after, before);
}

#[test]
fn update_excludes_session_from_its_own_count() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 1);

    let id = calendar.create_session(&request(hm(17, 0), hm(18, 0))).unwrap();
    let new_student = Uuid::new_v4();
    let moved = calendar
        .update_session(
            id,
            &SessionPatch {
                day: day(),
                start: hm(17, 15),
                end: hm(17, 45),
                student_id: Some(new_student),
                title: None,
            },
        )
        .unwrap();

    assert_eq!(moved.start.time(), hm(17, 15));
    assert_eq!(moved.student_id, new_student);
    assert_eq!(moved.title, "Math");
    assert_eq!(calendar.store().get(id).unwrap().unwrap(), moved);
}

#[test]
fn update_and_delete_unknown_session_return_not_found() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 10);
    let missing = Uuid::new_v4();

    let err = calendar
        .update_session(
            missing,
            &SessionPatch {
                day: day(),
                start: hm(17, 0),
                end: hm(18, 0),
                student_id: None,
                title: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, SchedulingError::NotFound(id) if id == missing));

    let err = calendar.delete_session(missing).unwrap_err();
    assert!(matches!(err, SchedulingError::NotFound(id) if id == missing));
}

#[test]
fn cancelled_session_frees_capacity_and_reactivation_is_checked() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 1);

    let first = calendar.create_session(&request(hm(18, 0), hm(19, 0))).unwrap();
    calendar.set_status(first, SessionStatus::Cancelled).unwrap();
    assert_eq!(calendar.occupancy(day(), hm(18, 0)).unwrap(), 0);

    calendar.create_session(&request(hm(18, 0), hm(19, 0))).unwrap();

    let err = calendar
        .set_status(first, SessionStatus::Scheduled)
        .unwrap_err();
    assert!(matches!(err, SchedulingError::CapacityExceeded { .. }));
    assert_eq!(
        calendar.store().get(first).unwrap().unwrap().status,
        SessionStatus::Cancelled
    );
    assert_eq!(calendar.sessions_on(day()).unwrap().len(), 2);
}

#[test]
fn day_occupancy_lists_every_bucket_with_remaining_capacity() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 3);

    calendar.create_session(&request(hm(16, 30), hm(17, 30))).unwrap();
    calendar.create_session(&request(hm(17, 0), hm(18, 0))).unwrap();

    let slots = calendar.day_occupancy(day()).unwrap();
    assert_eq!(slots.len(), 6);
    assert_eq!(slots[0].occupancy, 1);
    assert_eq!(slots[1].occupancy, 2);
    assert_eq!(slots[1].remaining(), 1);
    assert!(!slots[1].is_full());
    assert_eq!(slots[2].occupancy, 0);
}

#[test]
fn week_of_starts_on_monday_by_default() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 10);
    let wednesday = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
    let (first, last) = calendar.week_of(wednesday);
    assert_eq!(first, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
    assert_eq!(last, NaiveDate::from_ymd_opt(2025, 1, 12).unwrap());
}

#[derive(Default)]
struct Recorder(Mutex<Vec<ChangeEvent>>);

impl ChangeObserver for Recorder {
    fn on_change(&self, event: &ChangeEvent) {
        self.0.lock().unwrap().push(*event);
    }
}

#[test]
fn store_publishes_typed_events_for_committed_writes_only() {
    let conn = open_db_in_memory().unwrap();
    let calendar = calendar(&conn, 1);
    let recorder = Arc::new(Recorder::default());
    calendar.store().changes().subscribe(recorder.clone());

    let id = calendar.create_session(&request(hm(17, 0), hm(18, 0))).unwrap();
    assert!(calendar
        .create_session(&request(hm(17, 0), hm(18, 0)))
        .is_err());
    calendar.set_status(id, SessionStatus::Completed).unwrap();
    calendar.delete_session(id).unwrap();

    let events = recorder.0.lock().unwrap();
    let ops: Vec<ChangeOp> = events.iter().map(|event| event.op).collect();
    assert_eq!(
        ops,
        vec![ChangeOp::Created, ChangeOp::Updated, ChangeOp::Deleted]
    );
    assert!(events
        .iter()
        .all(|event| event.entity == ChangeEntity::Session(id)));
}

#[derive(Debug, Clone)]
enum Op {
    Create { start_quarter: u32, quarters: u32 },
    Move { pick: usize, start_quarter: u32, quarters: u32 },
    Delete { pick: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    // Quarter hours from 16:00; 24 quarters cover the default window.
    prop_oneof![
        (0u32..24, 1u32..8).prop_map(|(start_quarter, quarters)| Op::Create {
            start_quarter,
            quarters
        }),
        (any::<usize>(), 0u32..24, 1u32..8).prop_map(|(pick, start_quarter, quarters)| {
            Op::Move {
                pick,
                start_quarter,
                quarters,
            }
        }),
        any::<usize>().prop_map(|pick| Op::Delete { pick }),
    ]
}

fn quarter_time(quarter: u32) -> NaiveTime {
    let minutes = 16 * 60 + quarter * 15;
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn occupancy_never_exceeds_capacity(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let conn = open_db_in_memory().unwrap();
        let calendar = calendar(&conn, 2);
        let mut ids = Vec::new();

        for op in ops {
            match op {
                Op::Create { start_quarter, quarters } => {
                    let end_quarter = (start_quarter + quarters).min(24);
                    let result = calendar.create_session(&request(
                        quarter_time(start_quarter),
                        quarter_time(end_quarter),
                    ));
                    match result {
                        Ok(id) => ids.push(id),
                        Err(SchedulingError::CapacityExceeded { .. }) => {}
                        Err(other) => prop_assert!(false, "unexpected error: {other}"),
                    }
                }
                Op::Move { pick, start_quarter, quarters } => {
                    if ids.is_empty() {
                        continue;
                    }
                    let id = ids[pick % ids.len()];
                    let end_quarter = (start_quarter + quarters).min(24);
                    let patch = SessionPatch {
                        day: day(),
                        start: quarter_time(start_quarter),
                        end: quarter_time(end_quarter),
                        student_id: None,
                        title: None,
                    };
                    match calendar.update_session(id, &patch) {
                        Ok(_) | Err(SchedulingError::CapacityExceeded { .. }) => {}
                        Err(other) => prop_assert!(false, "unexpected error: {other}"),
                    }
                }
                Op::Delete { pick } => {
                    if ids.is_empty() {
                        continue;
                    }
                    let id = ids.remove(pick % ids.len());
                    calendar.delete_session(id).unwrap();
                }
            }

            for slot in calendar.day_occupancy(day()).unwrap() {
                prop_assert!(slot.occupancy <= 2);
            }
        }
    }
}
