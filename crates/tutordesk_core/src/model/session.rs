//! Class session domain model.
//!
//! # Responsibility
//! - Define the persisted session record bound to one student.
//! - Validate interval shape before any capacity check runs.
//!
//! # Invariants
//! - `start < end`, and both fall on the same calendar day.
//! - Only non-cancelled sessions occupy time buckets.

use crate::model::student::StudentId;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one class session.
pub type SessionId = Uuid;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Planned and counting toward slot capacity.
    Scheduled,
    /// Held; still counts toward the slot it was held in.
    Completed,
    /// Called off; frees its slots.
    Cancelled,
}

impl SessionStatus {
    /// Returns whether a session in this state counts toward occupancy.
    pub fn occupies_slot(self) -> bool {
        match self {
            Self::Scheduled | Self::Completed => true,
            Self::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Validation failures for session intervals and recurrence rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidationError {
    /// `start` is not strictly before `end`.
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// Session start and end are on different days.
    SpansMultipleDays {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// Interval leaves the configured operating hours.
    OutsideOperatingWindow {
        start: NaiveTime,
        end: NaiveTime,
        opening: NaiveTime,
        closing: NaiveTime,
    },
    /// Weekday outside `1..=7`.
    InvalidWeekday(u8),
    /// Recurrence rule selects no weekday.
    NoWeekdays,
    /// Recurrence start date after end date.
    InvertedDateRange { from: NaiveDate, to: NaiveDate },
}

impl Display for SessionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRange { start, end } => {
                write!(f, "session start {start} must be before end {end}")
            }
            Self::SpansMultipleDays { start, end } => {
                write!(f, "session {start}..{end} must start and end on the same day")
            }
            Self::OutsideOperatingWindow {
                start,
                end,
                opening,
                closing,
            } => write!(
                f,
                "session {}-{} is outside operating hours {}-{}",
                start.format("%H:%M"),
                end.format("%H:%M"),
                opening.format("%H:%M"),
                closing.format("%H:%M")
            ),
            Self::InvalidWeekday(day) => write!(f, "weekday {day} is not in 1..=7"),
            Self::NoWeekdays => write!(f, "recurrence must select at least one weekday"),
            Self::InvertedDateRange { from, to } => {
                write!(f, "recurrence start {from} is after end {to}")
            }
        }
    }
}

impl Error for SessionValidationError {}

/// Persisted class session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub student_id: StudentId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub title: String,
    pub status: SessionStatus,
}

impl Session {
    /// Creates a scheduled session with a generated id.
    pub fn new(
        student_id: StudentId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            start,
            end,
            title: title.into(),
            status: SessionStatus::Scheduled,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.start.date()
    }

    /// Returns whether this session overlaps `[from, to)`.
    pub fn overlaps(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        self.start < to && self.end > from
    }

    /// Validates interval shape. Operating-window checks live in the calendar
    /// because they depend on configuration.
    pub fn validate(&self) -> Result<(), SessionValidationError> {
        validate_interval(self.start, self.end)
    }
}

pub(crate) fn validate_interval(
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<(), SessionValidationError> {
    if start >= end {
        return Err(SessionValidationError::InvalidRange { start, end });
    }
    if start.date() != end.date() {
        return Err(SessionValidationError::SpansMultipleDays { start, end });
    }
    Ok(())
}
