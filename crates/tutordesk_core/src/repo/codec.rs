//! Text column encodings shared by SQLite stores.

use crate::repo::error::{StoreError, StoreResult};
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

/// Sortable local wall-clock timestamp, compared lexicographically in SQL.
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn datetime_to_db(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn date_to_db(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_datetime(value: &str, column: &str) -> StoreResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT).map_err(|_| {
        StoreError::InvalidData(format!("invalid timestamp `{value}` in {column}"))
    })
}

pub(crate) fn parse_date(value: &str, column: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| StoreError::InvalidData(format!("invalid date `{value}` in {column}")))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
