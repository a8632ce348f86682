//! Calendar month keys (`YYYY-MM`) and inclusive month ranges.
//!
//! # Invariants
//! - A `MonthKey` always wraps the first day of its month.
//! - Text form is exactly `YYYY-MM` with a zero-padded month.

use chrono::{Datelike, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static MONTH_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(0[1-9]|1[0-2])$").expect("valid month key regex"));

/// Errors for month key parsing and range construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthKeyError {
    /// Input does not match `YYYY-MM`.
    Malformed(String),
    /// Range start is after range end.
    InvertedRange { from: MonthKey, to: MonthKey },
}

impl Display for MonthKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(value) => write!(f, "invalid month key `{value}`; expected YYYY-MM"),
            Self::InvertedRange { from, to } => {
                write!(f, "month range start {from} is after end {to}")
            }
        }
    }
}

impl Error for MonthKeyError {}

/// Identifier of one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey(NaiveDate);

impl MonthKey {
    /// Returns the month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    /// Parses a strict `YYYY-MM` string.
    pub fn parse(value: &str) -> Result<Self, MonthKeyError> {
        let trimmed = value.trim();
        let caps = MONTH_KEY_RE
            .captures(trimmed)
            .ok_or_else(|| MonthKeyError::Malformed(value.to_string()))?;
        let year = caps[1]
            .parse::<i32>()
            .map_err(|_| MonthKeyError::Malformed(value.to_string()))?;
        let month = caps[2]
            .parse::<u32>()
            .map_err(|_| MonthKeyError::Malformed(value.to_string()))?;
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or_else(|| MonthKeyError::Malformed(value.to_string()))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn last_day(&self) -> NaiveDate {
        self.0
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// Month immediately before this one.
    pub fn previous(&self) -> Self {
        self.0.pred_opt().map(Self::from_date).unwrap_or(*self)
    }

    /// Month immediately after this one.
    pub fn next(&self) -> Self {
        self.last_day()
            .succ_opt()
            .map(Self::from_date)
            .unwrap_or(*self)
    }

    /// Returns whether `date` falls inside this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::from_date(date) == *self
    }
}

impl Display for MonthKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for MonthKey {
    type Err = MonthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = MonthKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

/// Inclusive range of months used by ledger aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    from: MonthKey,
    to: MonthKey,
}

impl MonthRange {
    pub fn new(from: MonthKey, to: MonthKey) -> Result<Self, MonthKeyError> {
        if from > to {
            return Err(MonthKeyError::InvertedRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn single(month: MonthKey) -> Self {
        Self {
            from: month,
            to: month,
        }
    }

    pub fn from(&self) -> MonthKey {
        self.from
    }

    pub fn to(&self) -> MonthKey {
        self.to
    }

    pub fn contains(&self, month: MonthKey) -> bool {
        self.from <= month && month <= self.to
    }

    /// First and last calendar day covered by the range, both inclusive.
    pub fn date_bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.from.first_day(), self.to.last_day())
    }
}
