//! Movement store contract and SQLite implementation.
//!
//! # Invariants
//! - Movements are insert/delete only; there is no update path.
//! - `list` order is stable: date, then creation order, then id.

use crate::changes::{ChangeEvent, ChangeFeed, ChangeOp};
use crate::model::month::MonthKey;
use crate::model::movement::{Movement, MovementId, MovementKind, MovementOrigin};
use crate::model::student::StudentId;
use crate::repo::codec::{date_to_db, parse_date, parse_uuid};
use crate::repo::error::{StoreError, StoreResult};
use rusqlite::{params, Connection, Row};

const MOVEMENT_SELECT_SQL: &str = "SELECT
    uuid,
    student_uuid,
    movement_date,
    kind,
    amount,
    note,
    payer,
    month_key,
    carryover_from
FROM movements";

/// Persistence operations the ledger needs for movements.
pub trait MovementStore {
    fn create(&self, movement: &Movement) -> StoreResult<MovementId>;
    fn delete(&self, id: MovementId) -> StoreResult<()>;
    fn list(&self) -> StoreResult<Vec<Movement>>;
    /// Whether a rollover carryover already exists for `student_id` in `month`.
    fn has_carryover(&self, student_id: StudentId, month: MonthKey) -> StoreResult<bool>;
    fn changes(&self) -> &ChangeFeed;
}

/// SQLite-backed movement store.
pub struct SqliteMovementStore<'conn> {
    conn: &'conn Connection,
    changes: ChangeFeed,
}

impl<'conn> SqliteMovementStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            changes: ChangeFeed::new(),
        }
    }
}

impl MovementStore for SqliteMovementStore<'_> {
    fn create(&self, movement: &Movement) -> StoreResult<MovementId> {
        movement
            .validate()
            .map_err(|err| StoreError::InvalidData(err.to_string()))?;

        let carryover_from = match movement.origin {
            MovementOrigin::Manual => None,
            MovementOrigin::Carryover { from } => Some(from.to_string()),
        };

        // A second carryover for the same student and month fails on
        // idx_movements_carryover_once.
        self.conn.execute(
            "INSERT INTO movements (
                uuid,
                student_uuid,
                movement_date,
                kind,
                amount,
                note,
                payer,
                month_key,
                carryover_from
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                movement.id.to_string(),
                movement.student_id.to_string(),
                date_to_db(movement.date),
                movement.kind.as_str(),
                movement.amount,
                movement.note.as_deref(),
                movement.payer.as_deref(),
                movement.month_key.to_string(),
                carryover_from,
            ],
        )?;

        self.changes
            .publish(ChangeEvent::movement(movement.id, ChangeOp::Created));
        Ok(movement.id)
    }

    fn delete(&self, id: MovementId) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM movements WHERE uuid = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        self.changes
            .publish(ChangeEvent::movement(id, ChangeOp::Deleted));
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<Movement>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MOVEMENT_SELECT_SQL} ORDER BY movement_date ASC, created_at ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut movements = Vec::new();
        while let Some(row) = rows.next()? {
            movements.push(parse_movement_row(row)?);
        }
        Ok(movements)
    }

    fn has_carryover(&self, student_id: StudentId, month: MonthKey) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM movements
                WHERE student_uuid = ?1
                  AND month_key = ?2
                  AND carryover_from IS NOT NULL
            );",
            params![student_id.to_string(), month.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn changes(&self) -> &ChangeFeed {
        &self.changes
    }
}

fn parse_movement_row(row: &Row<'_>) -> StoreResult<Movement> {
    let uuid_text: String = row.get("uuid")?;
    let student_text: String = row.get("student_uuid")?;
    let date_text: String = row.get("movement_date")?;
    let kind_text: String = row.get("kind")?;
    let month_text: String = row.get("month_key")?;

    let kind = MovementKind::parse(&kind_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid movement kind `{kind_text}` in movements.kind"))
    })?;
    let month_key = parse_month(&month_text, "movements.month_key")?;
    let origin = match row.get::<_, Option<String>>("carryover_from")? {
        Some(from) => MovementOrigin::Carryover {
            from: parse_month(&from, "movements.carryover_from")?,
        },
        None => MovementOrigin::Manual,
    };

    let movement = Movement {
        id: parse_uuid(&uuid_text, "movements.uuid")?,
        student_id: parse_uuid(&student_text, "movements.student_uuid")?,
        date: parse_date(&date_text, "movements.movement_date")?,
        kind,
        amount: row.get("amount")?,
        note: row.get("note")?,
        payer: row.get("payer")?,
        month_key,
        origin,
    };
    movement
        .validate()
        .map_err(|err| StoreError::InvalidData(err.to_string()))?;
    Ok(movement)
}

fn parse_month(value: &str, column: &str) -> StoreResult<MonthKey> {
    MonthKey::parse(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid month key `{value}` in {column}")))
}
