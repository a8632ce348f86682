//! Capacity-bounded session calendar.
//!
//! # Responsibility
//! - Validate session intervals against the operating window.
//! - Enforce per-bucket capacity on create, reschedule and re-activation.
//! - Expose slot occupancy for reporting.
//!
//! # Invariants
//! - After any committed create/update, every bucket holds at most
//!   `max_per_slot` occupying sessions.
//! - A session counts toward every bucket its interval overlaps.
//! - A failed mutation leaves the stored session untouched.
//!
//! Capacity is checked at mutation time only. Two independent processes can
//! both pass the check for the same bucket; the database file is expected to
//! have a single owning process.

use crate::config::{ConfigError, CoreConfig};
use crate::model::session::{
    validate_interval, Session, SessionId, SessionStatus, SessionValidationError,
};
use crate::model::slot::{buckets_for_day, overlapped_buckets, SlotOccupancy, TimeBucket};
use crate::model::student::StudentId;
use crate::repo::error::StoreError;
use crate::repo::session_repo::SessionStore;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from calendar and recurrence operations.
#[derive(Debug)]
pub enum SchedulingError {
    Validation(SessionValidationError),
    /// Bucket already holds `capacity` sessions.
    CapacityExceeded { bucket: TimeBucket, capacity: usize },
    NotFound(SessionId),
    Store(StoreError),
}

impl Display for SchedulingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::CapacityExceeded { bucket, capacity } => write!(
                f,
                "slot {} {} is full ({capacity} sessions)",
                bucket.day(),
                bucket.start_time().format("%H:%M")
            ),
            Self::NotFound(id) => write!(f, "session not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SchedulingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::CapacityExceeded { .. } | Self::NotFound(_) => None,
        }
    }
}

impl From<SessionValidationError> for SchedulingError {
    fn from(value: SessionValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for SchedulingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Request to place one session on a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionRequest {
    pub day: NaiveDate,
    pub student_id: StudentId,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub title: String,
}

/// Reschedule request. `None` keeps the current student/title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPatch {
    pub day: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub student_id: Option<StudentId>,
    pub title: Option<String>,
}

/// Session calendar over an injected store.
pub struct SlotCalendar<S: SessionStore> {
    store: S,
    config: CoreConfig,
}

impl<S: SessionStore> SlotCalendar<S> {
    pub fn try_new(store: S, config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Occupying sessions overlapping `[bucket_start, bucket_start + width)`.
    pub fn sessions_in_slot(
        &self,
        day: NaiveDate,
        bucket_start: NaiveTime,
    ) -> Result<Vec<Session>, SchedulingError> {
        let bucket = TimeBucket::starting_at(&self.config, day, bucket_start);
        let sessions = self.store.list_by_date_range(bucket.start, bucket.end)?;
        Ok(sessions
            .into_iter()
            .filter(|session| session.status.occupies_slot())
            .collect())
    }

    pub fn occupancy(
        &self,
        day: NaiveDate,
        bucket_start: NaiveTime,
    ) -> Result<usize, SchedulingError> {
        Ok(self.sessions_in_slot(day, bucket_start)?.len())
    }

    /// Occupancy for every bucket of the operating window on `day`.
    pub fn day_occupancy(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<SlotOccupancy>, SchedulingError> {
        let sessions = self.occupying_sessions_on(day, None)?;
        Ok(buckets_for_day(&self.config, day)
            .into_iter()
            .map(|bucket| SlotOccupancy {
                bucket,
                occupancy: count_overlapping(&sessions, &bucket),
                capacity: self.config.max_per_slot,
            })
            .collect())
    }

    /// Every session on `day`, cancelled ones included.
    pub fn sessions_on(&self, day: NaiveDate) -> Result<Vec<Session>, SchedulingError> {
        self.sessions_between(day, day)
    }

    /// Every session on the days `[from, to]` (inclusive).
    pub fn sessions_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Session>, SchedulingError> {
        if from > to {
            return Err(SessionValidationError::InvertedDateRange { from, to }.into());
        }
        let (start, end) = (start_of_day(from), start_of_day(to) + Duration::days(1));
        Ok(self.store.list_by_date_range(start, end)?)
    }

    /// First and last day of the week containing `day`.
    pub fn week_of(&self, day: NaiveDate) -> (NaiveDate, NaiveDate) {
        let week = day.week(self.config.week_start.weekday());
        (week.first_day(), week.last_day())
    }

    /// Places one session after window and capacity checks.
    ///
    /// # Errors
    /// - `Validation` when the interval is empty or outside operating hours.
    /// - `CapacityExceeded` when any overlapped bucket is full.
    /// - `Store` when persistence fails.
    pub fn create_session(
        &self,
        request: &NewSessionRequest,
    ) -> Result<SessionId, SchedulingError> {
        let start = to_stored_precision(request.day.and_time(request.start));
        let end = to_stored_precision(request.day.and_time(request.end));
        self.ensure_schedulable(start, end, None)?;

        let session = Session::new(request.student_id, start, end, request.title.trim());
        let id = self.store.create(&session)?;
        info!(
            "event=session_create module=calendar status=ok session_id={} day={} start={} end={}",
            id,
            request.day,
            request.start.format("%H:%M"),
            request.end.format("%H:%M")
        );
        Ok(id)
    }

    /// Moves a session to a new interval, excluding it from its own count.
    pub fn update_session(
        &self,
        id: SessionId,
        patch: &SessionPatch,
    ) -> Result<Session, SchedulingError> {
        let mut session = self.store.get(id)?.ok_or(SchedulingError::NotFound(id))?;
        let start = to_stored_precision(patch.day.and_time(patch.start));
        let end = to_stored_precision(patch.day.and_time(patch.end));

        // Cancelled sessions only need to stay inside opening hours.
        if session.status.occupies_slot() {
            self.ensure_schedulable(start, end, Some(id))?;
        } else {
            self.ensure_within_window(start, end)?;
        }

        session.start = start;
        session.end = end;
        if let Some(student_id) = patch.student_id {
            session.student_id = student_id;
        }
        if let Some(title) = &patch.title {
            session.title = title.trim().to_string();
        }
        self.store.update(&session)?;
        info!(
            "event=session_update module=calendar status=ok session_id={} day={}",
            id, patch.day
        );
        Ok(session)
    }

    /// Changes lifecycle state. Re-activating a cancelled session re-checks
    /// capacity because it starts occupying its buckets again.
    pub fn set_status(
        &self,
        id: SessionId,
        status: SessionStatus,
    ) -> Result<Session, SchedulingError> {
        let mut session = self.store.get(id)?.ok_or(SchedulingError::NotFound(id))?;
        if status.occupies_slot() && !session.status.occupies_slot() {
            self.ensure_capacity(session.start, session.end, Some(id))?;
        }
        session.status = status;
        self.store.update(&session)?;
        info!(
            "event=session_status module=calendar status=ok session_id={} new_status={}",
            id,
            status.as_str()
        );
        Ok(session)
    }

    /// Deletes a session. Its buckets free up on the next query.
    pub fn delete_session(&self, id: SessionId) -> Result<(), SchedulingError> {
        self.store.delete(id)?;
        info!("event=session_delete module=calendar status=ok session_id={id}");
        Ok(())
    }

    fn ensure_schedulable(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude: Option<SessionId>,
    ) -> Result<(), SchedulingError> {
        self.ensure_within_window(start, end)?;
        self.ensure_capacity(start, end, exclude)
    }

    pub(crate) fn ensure_within_window(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<(), SchedulingError> {
        validate_interval(start, end)?;
        let (opening, closing) = (self.config.opening_time, self.config.closing_time);
        if start.time() < opening || end.time() > closing {
            return Err(SessionValidationError::OutsideOperatingWindow {
                start: start.time(),
                end: end.time(),
                opening,
                closing,
            }
            .into());
        }
        Ok(())
    }

    fn ensure_capacity(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude: Option<SessionId>,
    ) -> Result<(), SchedulingError> {
        let sessions = self.occupying_sessions_on(start.date(), exclude)?;
        let capacity = self.config.max_per_slot;
        // First full bucket wins; later buckets are not reported.
        for bucket in overlapped_buckets(&self.config, start, end) {
            if count_overlapping(&sessions, &bucket) >= capacity {
                warn!(
                    "event=capacity_exceeded module=calendar status=rejected day={} bucket={} capacity={}",
                    bucket.day(),
                    bucket.start_time().format("%H:%M"),
                    capacity
                );
                return Err(SchedulingError::CapacityExceeded { bucket, capacity });
            }
        }
        Ok(())
    }

    fn occupying_sessions_on(
        &self,
        day: NaiveDate,
        exclude: Option<SessionId>,
    ) -> Result<Vec<Session>, SchedulingError> {
        let start = start_of_day(day);
        let sessions = self
            .store
            .list_by_date_range(start, start + Duration::days(1))?;
        Ok(sessions
            .into_iter()
            .filter(|session| session.status.occupies_slot())
            .filter(|session| Some(session.id) != exclude)
            .collect())
    }
}

/// Sessions are persisted with whole-second timestamps.
fn to_stored_precision(value: NaiveDateTime) -> NaiveDateTime {
    value.trunc_subsecs(0)
}

fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

fn count_overlapping(sessions: &[Session], bucket: &TimeBucket) -> usize {
    sessions
        .iter()
        .filter(|session| session.overlaps(bucket.start, bucket.end))
        .count()
}
