use chrono::NaiveDate;
use rusqlite::Connection;
use tutordesk_core::db::open_db_in_memory;
use tutordesk_core::{
    FixedClock, LedgerEngine, MonthKey, MonthRange, MovementKind, MovementOrigin, MovementStore,
    NewMovement, RolloverError, RolloverMarkerStore, RolloverOutcome, RolloverReport,
    RolloverScheduler, RolloverState, SqliteMarkerStore, SqliteMovementStore,
    SqliteStudentDirectory, StoreError, Student, StudentId,
};

type Ledger<'conn> = LedgerEngine<SqliteMovementStore<'conn>, SqliteStudentDirectory<'conn>>;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn month(value: &str) -> MonthKey {
    MonthKey::parse(value).unwrap()
}

fn ledger(conn: &Connection) -> Ledger<'_> {
    LedgerEngine::new(
        SqliteMovementStore::new(conn),
        SqliteStudentDirectory::new(conn),
    )
}

fn add_student(conn: &Connection, name: &str) -> StudentId {
    SqliteStudentDirectory::new(conn)
        .create_student(&Student::new(name))
        .unwrap()
}

fn completed(outcome: RolloverOutcome) -> RolloverReport {
    match outcome {
        RolloverOutcome::Completed(report) => report,
        RolloverOutcome::AlreadyDone(month) => panic!("rollover already done for {month}"),
    }
}

#[test]
fn positive_january_balance_is_carried_into_february() {
    let conn = open_db_in_memory().unwrap();
    let ledger = ledger(&conn);
    let student = add_student(&conn, "Ana");
    ledger
        .add_movement(NewMovement::debt(student, date(2025, 1, 10), 100))
        .unwrap();
    ledger
        .add_movement(NewMovement::payment(student, date(2025, 1, 20), 40))
        .unwrap();

    let clock = FixedClock::new(date(2025, 2, 3));
    let marker = SqliteMarkerStore::new(&conn);
    let scheduler = RolloverScheduler::new(&ledger, &marker, &clock);
    assert_eq!(scheduler.state().unwrap(), RolloverState::Pending(month("2025-02")));

    let report = completed(scheduler.run_if_due().unwrap());
    assert_eq!(report.month, month("2025-02"));
    assert_eq!(report.from, month("2025-01"));
    assert_eq!(report.carried.len(), 1);
    assert_eq!(report.carried[0].student_id, student);
    assert_eq!(report.carried[0].amount, 60);

    let february = ledger
        .movements_for(student, MonthRange::single(month("2025-02")))
        .unwrap();
    assert_eq!(february.len(), 1);
    let carried = &february[0];
    assert_eq!(carried.id, report.carried[0].movement_id);
    assert_eq!(carried.kind, MovementKind::Debt);
    assert_eq!(carried.amount, 60);
    assert_eq!(carried.date, date(2025, 2, 1));
    assert_eq!(
        carried.origin,
        MovementOrigin::Carryover {
            from: month("2025-01")
        }
    );
    assert_eq!(
        carried.note.as_deref(),
        Some("Carried-over balance from 2025-01")
    );

    assert_eq!(marker.read().unwrap(), Some(month("2025-02")));
    assert_eq!(scheduler.state().unwrap(), RolloverState::Done(month("2025-02")));
}

#[test]
fn zero_and_negative_balances_are_not_carried() {
    let conn = open_db_in_memory().unwrap();
    let ledger = ledger(&conn);
    let settled = add_student(&conn, "Ana");
    let overpaid = add_student(&conn, "Bruno");
    let idle = add_student(&conn, "Carla");

    ledger
        .add_movement(NewMovement::debt(settled, date(2025, 1, 5), 80))
        .unwrap();
    ledger
        .add_movement(NewMovement::payment(settled, date(2025, 1, 6), 80))
        .unwrap();
    ledger
        .add_movement(NewMovement::payment(overpaid, date(2025, 1, 6), 30))
        .unwrap();

    let clock = FixedClock::new(date(2025, 2, 1));
    let scheduler = RolloverScheduler::new(&ledger, SqliteMarkerStore::new(&conn), &clock);
    let report = completed(scheduler.run_if_due().unwrap());

    assert!(report.carried.is_empty());
    for student in [settled, overpaid, idle] {
        assert!(!ledger.has_carryover(student, month("2025-02")).unwrap());
    }
    assert_eq!(scheduler.state().unwrap(), RolloverState::Done(month("2025-02")));
}

#[test]
fn second_run_in_same_month_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let ledger = ledger(&conn);
    let student = add_student(&conn, "Ana");
    ledger
        .add_movement(NewMovement::debt(student, date(2025, 1, 10), 60))
        .unwrap();

    let clock = FixedClock::new(date(2025, 2, 1));
    let scheduler = RolloverScheduler::new(&ledger, SqliteMarkerStore::new(&conn), &clock);
    completed(scheduler.run_if_due().unwrap());

    clock.set(date(2025, 2, 28));
    assert_eq!(
        scheduler.run_if_due().unwrap(),
        RolloverOutcome::AlreadyDone(month("2025-02"))
    );
    assert_eq!(ledger.movement_store().list().unwrap().len(), 2);
}

#[test]
fn interrupted_run_resumes_without_duplicating_carryovers() {
    let conn = open_db_in_memory().unwrap();
    let ledger = ledger(&conn);
    let ana = add_student(&conn, "Ana");
    let bruno = add_student(&conn, "Bruno");
    ledger
        .add_movement(NewMovement::debt(ana, date(2025, 1, 10), 60))
        .unwrap();
    ledger
        .add_movement(NewMovement::debt(bruno, date(2025, 1, 11), 25))
        .unwrap();

    // Ana's carryover landed before the crash; the marker was never written.
    ledger
        .add_movement(
            NewMovement::debt(ana, date(2025, 2, 1), 60).carried_from(month("2025-01")),
        )
        .unwrap();

    let clock = FixedClock::new(date(2025, 2, 2));
    let scheduler = RolloverScheduler::new(&ledger, SqliteMarkerStore::new(&conn), &clock);
    let report = completed(scheduler.run_if_due().unwrap());

    assert_eq!(report.already_carried, 1);
    assert_eq!(report.carried.len(), 1);
    assert_eq!(report.carried[0].student_id, bruno);
    assert_eq!(report.carried[0].amount, 25);

    let ana_february = ledger
        .movements_for(ana, MonthRange::single(month("2025-02")))
        .unwrap();
    assert_eq!(ana_february.len(), 1);
}

#[test]
fn inactive_students_are_skipped() {
    let conn = open_db_in_memory().unwrap();
    let ledger = ledger(&conn);
    let student = add_student(&conn, "Ana");
    ledger
        .add_movement(NewMovement::debt(student, date(2025, 1, 10), 60))
        .unwrap();
    SqliteStudentDirectory::new(&conn)
        .set_active(student, false)
        .unwrap();

    let clock = FixedClock::new(date(2025, 2, 1));
    let scheduler = RolloverScheduler::new(&ledger, SqliteMarkerStore::new(&conn), &clock);
    let report = completed(scheduler.run_if_due().unwrap());

    assert!(report.carried.is_empty());
    assert!(!ledger.has_carryover(student, month("2025-02")).unwrap());
}

#[test]
fn unpaid_carryover_chains_into_the_next_month() {
    let conn = open_db_in_memory().unwrap();
    let ledger = ledger(&conn);
    let student = add_student(&conn, "Ana");
    ledger
        .add_movement(NewMovement::debt(student, date(2025, 1, 10), 100))
        .unwrap();
    ledger
        .add_movement(NewMovement::payment(student, date(2025, 1, 20), 40))
        .unwrap();

    let clock = FixedClock::new(date(2025, 2, 1));
    let scheduler = RolloverScheduler::new(&ledger, SqliteMarkerStore::new(&conn), &clock);
    completed(scheduler.run_if_due().unwrap());

    clock.set(date(2025, 3, 1));
    assert_eq!(scheduler.state().unwrap(), RolloverState::Pending(month("2025-03")));
    let report = completed(scheduler.run_if_due().unwrap());

    assert_eq!(report.from, month("2025-02"));
    assert_eq!(report.carried.len(), 1);
    assert_eq!(report.carried[0].amount, 60);
    let march = ledger
        .monthly_totals(student, MonthRange::single(month("2025-03")))
        .unwrap();
    assert_eq!(march.pending, 60);
}

#[test]
fn store_rejects_second_carryover_for_same_student_and_month() {
    let conn = open_db_in_memory().unwrap();
    let ledger = ledger(&conn);
    let student = add_student(&conn, "Ana");

    let request = NewMovement::debt(student, date(2025, 2, 1), 60).carried_from(month("2025-01"));
    ledger.add_movement(request.clone()).unwrap();

    let duplicate = request.into_movement().unwrap();
    let err = ledger.movement_store().create(&duplicate).unwrap_err();
    assert!(matches!(err, StoreError::Db(_)));

    // Manual debts in the same month stay unrestricted.
    ledger
        .add_movement(NewMovement::debt(student, date(2025, 2, 1), 60))
        .unwrap();
    ledger
        .add_movement(NewMovement::debt(student, date(2025, 2, 2), 60))
        .unwrap();
}

#[test]
fn overflowing_balance_fails_rollover_and_keeps_marker_unset() {
    let conn = open_db_in_memory().unwrap();
    let ledger = ledger(&conn);
    let student = add_student(&conn, "Ana");
    ledger
        .add_movement(NewMovement::debt(student, date(2025, 1, 10), i64::MAX))
        .unwrap();
    ledger
        .add_movement(NewMovement::debt(student, date(2025, 1, 11), 1))
        .unwrap();

    let clock = FixedClock::new(date(2025, 2, 1));
    let marker = SqliteMarkerStore::new(&conn);
    let scheduler = RolloverScheduler::new(&ledger, &marker, &clock);

    let err = scheduler.run_if_due().unwrap_err();
    assert!(matches!(err, RolloverError::Ledger(_)));
    assert_eq!(marker.read().unwrap(), None);
    assert!(!ledger.has_carryover(student, month("2025-02")).unwrap());
}
