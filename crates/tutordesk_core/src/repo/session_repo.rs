//! Session store contract and SQLite implementation.
//!
//! # Invariants
//! - Write paths call `Session::validate()` before SQL mutations.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - `list_by_date_range` returns sessions overlapping `[start, end)`,
//!   ordered by start then id.

use crate::changes::{ChangeEvent, ChangeFeed, ChangeOp};
use crate::model::session::{Session, SessionId, SessionStatus};
use crate::repo::codec::{datetime_to_db, parse_datetime, parse_uuid};
use crate::repo::error::{StoreError, StoreResult};
use chrono::{NaiveDateTime, Timelike};
use rusqlite::{params, Connection, Row};

const SESSION_SELECT_SQL: &str = "SELECT
    uuid,
    student_uuid,
    start_at,
    end_at,
    title,
    status
FROM sessions";

/// Persistence operations the calendar needs for sessions.
pub trait SessionStore {
    fn create(&self, session: &Session) -> StoreResult<SessionId>;
    /// Replaces every mutable field of an existing session.
    fn update(&self, session: &Session) -> StoreResult<()>;
    fn delete(&self, id: SessionId) -> StoreResult<()>;
    fn get(&self, id: SessionId) -> StoreResult<Option<Session>>;
    fn list_by_date_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> StoreResult<Vec<Session>>;
    fn changes(&self) -> &ChangeFeed;
}

/// SQLite-backed session store.
pub struct SqliteSessionStore<'conn> {
    conn: &'conn Connection,
    changes: ChangeFeed,
}

impl<'conn> SqliteSessionStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            changes: ChangeFeed::new(),
        }
    }
}

impl SessionStore for SqliteSessionStore<'_> {
    fn create(&self, session: &Session) -> StoreResult<SessionId> {
        ensure_storable(session)?;

        self.conn.execute(
            "INSERT INTO sessions (
                uuid,
                student_uuid,
                start_at,
                end_at,
                title,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                session.id.to_string(),
                session.student_id.to_string(),
                datetime_to_db(session.start),
                datetime_to_db(session.end),
                session.title.as_str(),
                session.status.as_str(),
            ],
        )?;

        self.changes
            .publish(ChangeEvent::session(session.id, ChangeOp::Created));
        Ok(session.id)
    }

    fn update(&self, session: &Session) -> StoreResult<()> {
        ensure_storable(session)?;

        let changed = self.conn.execute(
            "UPDATE sessions
             SET
                student_uuid = ?1,
                start_at = ?2,
                end_at = ?3,
                title = ?4,
                status = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?6;",
            params![
                session.student_id.to_string(),
                datetime_to_db(session.start),
                datetime_to_db(session.end),
                session.title.as_str(),
                session.status.as_str(),
                session.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(session.id));
        }

        self.changes
            .publish(ChangeEvent::session(session.id, ChangeOp::Updated));
        Ok(())
    }

    fn delete(&self, id: SessionId) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM sessions WHERE uuid = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        self.changes
            .publish(ChangeEvent::session(id, ChangeOp::Deleted));
        Ok(())
    }

    fn get(&self, id: SessionId) -> StoreResult<Option<Session>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SESSION_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_session_row(row)?));
        }
        Ok(None)
    }

    fn list_by_date_range(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> StoreResult<Vec<Session>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SESSION_SELECT_SQL}
             WHERE start_at < ?2
               AND end_at > ?1
             ORDER BY start_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query(params![datetime_to_db(start), datetime_to_db(end)])?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(parse_session_row(row)?);
        }
        Ok(sessions)
    }

    fn changes(&self) -> &ChangeFeed {
        &self.changes
    }
}

/// Rejects sessions that would not survive a round trip through the
/// whole-second `start_at`/`end_at` columns.
fn ensure_storable(session: &Session) -> StoreResult<()> {
    session
        .validate()
        .map_err(|err| StoreError::InvalidData(err.to_string()))?;
    if session.start.nanosecond() != 0 || session.end.nanosecond() != 0 {
        return Err(StoreError::InvalidData(format!(
            "session {} has sub-second timestamps",
            session.id
        )));
    }
    Ok(())
}

fn parse_session_row(row: &Row<'_>) -> StoreResult<Session> {
    let uuid_text: String = row.get("uuid")?;
    let student_text: String = row.get("student_uuid")?;
    let start_text: String = row.get("start_at")?;
    let end_text: String = row.get("end_at")?;
    let status_text: String = row.get("status")?;

    let status = SessionStatus::parse(&status_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid session status `{status_text}` in sessions.status"
        ))
    })?;

    let session = Session {
        id: parse_uuid(&uuid_text, "sessions.uuid")?,
        student_id: parse_uuid(&student_text, "sessions.student_uuid")?,
        start: parse_datetime(&start_text, "sessions.start_at")?,
        end: parse_datetime(&end_text, "sessions.end_at")?,
        title: row.get("title")?,
        status,
    };
    session
        .validate()
        .map_err(|err| StoreError::InvalidData(err.to_string()))?;
    Ok(session)
}
