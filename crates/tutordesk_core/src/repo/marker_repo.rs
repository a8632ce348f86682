//! Local rollover idempotence marker.
//!
//! One string setting holding the month key of the last completed rollover.

use crate::model::month::MonthKey;
use crate::repo::error::{StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};

pub const ROLLOVER_MARKER_KEY: &str = "rollover.last_month";

pub trait RolloverMarkerStore {
    fn read(&self) -> StoreResult<Option<MonthKey>>;
    fn write(&self, month: MonthKey) -> StoreResult<()>;
}

/// Marker kept in the `local_settings` table of the on-device database.
pub struct SqliteMarkerStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMarkerStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RolloverMarkerStore for SqliteMarkerStore<'_> {
    fn read(&self) -> StoreResult<Option<MonthKey>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM local_settings WHERE key = ?1;",
                [ROLLOVER_MARKER_KEY],
                |row| row.get(0),
            )
            .optional()?;

        value
            .map(|text| {
                MonthKey::parse(&text).map_err(|_| {
                    StoreError::InvalidData(format!(
                        "invalid month key `{text}` in local_settings.{ROLLOVER_MARKER_KEY}"
                    ))
                })
            })
            .transpose()
    }

    fn write(&self, month: MonthKey) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO local_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![ROLLOVER_MARKER_KEY, month.to_string()],
        )?;
        Ok(())
    }
}

impl<K: RolloverMarkerStore + ?Sized> RolloverMarkerStore for &K {
    fn read(&self) -> StoreResult<Option<MonthKey>> {
        (**self).read()
    }

    fn write(&self, month: MonthKey) -> StoreResult<()> {
        (**self).write(month)
    }
}
