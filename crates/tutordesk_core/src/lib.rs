//! Core domain logic for TutorDesk.
//! This crate is the single source of truth for scheduling capacity and
//! ledger invariants.

pub mod changes;
pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use changes::{ChangeEntity, ChangeEvent, ChangeFeed, ChangeObserver, ChangeOp};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{load_config, parse_config, ConfigError, CoreConfig, WeekStart};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::month::{MonthKey, MonthKeyError, MonthRange};
pub use model::movement::{
    Movement, MovementId, MovementKind, MovementOrigin, MovementValidationError, NewMovement,
};
pub use model::session::{Session, SessionId, SessionStatus, SessionValidationError};
pub use model::slot::{SlotOccupancy, TimeBucket};
pub use model::student::{Student, StudentId};
pub use repo::error::{StoreError, StoreResult};
pub use repo::marker_repo::{RolloverMarkerStore, SqliteMarkerStore};
pub use repo::movement_repo::{MovementStore, SqliteMovementStore};
pub use repo::session_repo::{SessionStore, SqliteSessionStore};
pub use repo::student_repo::{SqliteStudentDirectory, StudentDirectory};
pub use service::ledger::{LedgerEngine, LedgerError, MonthlyTotals, StudentMonthlyTotals};
pub use service::recurrence::{
    weekday_number, RecurrenceExpander, RecurrenceReport, RecurrenceRule, SkippedOccurrence,
};
pub use service::rollover::{
    CarriedBalance, RolloverError, RolloverOutcome, RolloverReport, RolloverScheduler,
    RolloverState,
};
pub use service::slot_calendar::{NewSessionRequest, SchedulingError, SessionPatch, SlotCalendar};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
