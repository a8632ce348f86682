//! Weekly recurrence expansion into concrete sessions.
//!
//! # Responsibility
//! - Walk a date range day by day and create one session per selected
//!   weekday through the calendar.
//! - Collect a created/skipped report instead of aborting on a full slot.
//!
//! # Invariants
//! - Occurrences are created sequentially in chronological order, so each
//!   capacity check sees every earlier occurrence of the same batch.
//! - Only `CapacityExceeded` is turned into a skip; store failures abort.
//! - Weekdays are numbered 1=Monday .. 7=Sunday.

use crate::model::session::{SessionId, SessionValidationError};
use crate::model::slot::TimeBucket;
use crate::model::student::StudentId;
use crate::repo::session_repo::SessionStore;
use crate::service::slot_calendar::{NewSessionRequest, SchedulingError, SlotCalendar};
use chrono::{Datelike, NaiveDate, NaiveTime};
use log::info;
use std::collections::BTreeSet;

/// Weekly repetition rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    /// Selected weekdays, 1=Monday .. 7=Sunday.
    pub weekdays: BTreeSet<u8>,
    /// First candidate date (inclusive).
    pub from: NaiveDate,
    /// Last candidate date (inclusive).
    pub to: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub student_id: StudentId,
    pub title: String,
}

impl RecurrenceRule {
    pub fn validate(&self) -> Result<(), SessionValidationError> {
        if self.weekdays.is_empty() {
            return Err(SessionValidationError::NoWeekdays);
        }
        if let Some(day) = self.weekdays.iter().find(|day| !(1..=7).contains(*day)) {
            return Err(SessionValidationError::InvalidWeekday(*day));
        }
        if self.from > self.to {
            return Err(SessionValidationError::InvertedDateRange {
                from: self.from,
                to: self.to,
            });
        }
        if self.start_time >= self.end_time {
            return Err(SessionValidationError::InvalidRange {
                start: self.from.and_time(self.start_time),
                end: self.from.and_time(self.end_time),
            });
        }
        Ok(())
    }

    /// Whether `date` falls on a selected weekday.
    pub fn selects(&self, date: NaiveDate) -> bool {
        self.weekdays.contains(&weekday_number(date))
    }
}

/// ISO weekday number: Monday=1 .. Sunday=7.
pub fn weekday_number(date: NaiveDate) -> u8 {
    // number_from_monday is always within 1..=7.
    date.weekday().number_from_monday() as u8
}

/// Occurrence that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOccurrence {
    pub date: NaiveDate,
    /// First full bucket the occurrence would have overlapped.
    pub bucket: TimeBucket,
}

/// Outcome of one recurrence batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurrenceReport {
    pub created: Vec<(NaiveDate, SessionId)>,
    pub skipped: Vec<SkippedOccurrence>,
}

impl RecurrenceReport {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// User-facing summary line, e.g. `created 8, skipped 2 due to capacity`.
    pub fn summary(&self) -> String {
        if self.skipped.is_empty() {
            format!("created {}", self.created_count())
        } else {
            format!(
                "created {}, skipped {} due to capacity",
                self.created_count(),
                self.skipped_count()
            )
        }
    }
}

/// Batch creator bound to one calendar.
pub struct RecurrenceExpander<'cal, S: SessionStore> {
    calendar: &'cal SlotCalendar<S>,
}

impl<'cal, S: SessionStore> RecurrenceExpander<'cal, S> {
    pub fn new(calendar: &'cal SlotCalendar<S>) -> Self {
        Self { calendar }
    }

    /// Dates the rule targets, without touching the store.
    pub fn preview(&self, rule: &RecurrenceRule) -> Result<Vec<NaiveDate>, SchedulingError> {
        rule.validate()?;
        Ok(candidate_dates(rule))
    }

    /// Creates every selected occurrence, skipping the ones whose slot is full.
    ///
    /// # Errors
    /// - `Validation` when the rule itself is malformed or its time of day is
    ///   outside operating hours; nothing is created in that case.
    /// - `Store` as soon as persistence fails; occurrences created before the
    ///   failure stay in place.
    pub fn expand(&self, rule: &RecurrenceRule) -> Result<RecurrenceReport, SchedulingError> {
        rule.validate()?;
        self.calendar.ensure_within_window(
            rule.from.and_time(rule.start_time),
            rule.from.and_time(rule.end_time),
        )?;

        let mut report = RecurrenceReport::default();
        for date in candidate_dates(rule) {
            let request = NewSessionRequest {
                day: date,
                student_id: rule.student_id,
                start: rule.start_time,
                end: rule.end_time,
                title: rule.title.clone(),
            };
            match self.calendar.create_session(&request) {
                Ok(id) => report.created.push((date, id)),
                Err(SchedulingError::CapacityExceeded { bucket, .. }) => {
                    report.skipped.push(SkippedOccurrence { date, bucket });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            "event=recurrence_batch module=recurrence status=ok student_id={} from={} to={} created={} skipped={}",
            rule.student_id,
            rule.from,
            rule.to,
            report.created_count(),
            report.skipped_count()
        );
        Ok(report)
    }
}

fn candidate_dates(rule: &RecurrenceRule) -> Vec<NaiveDate> {
    rule.from
        .iter_days()
        .take_while(|date| *date <= rule.to)
        .filter(|date| rule.selects(*date))
        .collect()
}
