//! Student directory contract and SQLite implementation.
//!
//! The core only reads students. The SQLite directory also exposes the small
//! write surface the CLI and tests use to register students.

use crate::model::student::{Student, StudentId};
use crate::repo::codec::{bool_to_int, parse_uuid};
use crate::repo::error::{StoreError, StoreResult};
use rusqlite::{params, Connection, Row};

/// Read-only view of students needed by the ledger.
pub trait StudentDirectory {
    fn get(&self, id: StudentId) -> StoreResult<Option<Student>>;
    /// Active students, ordered by name.
    fn list_active(&self) -> StoreResult<Vec<Student>>;
}

pub struct SqliteStudentDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStudentDirectory<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn create_student(&self, student: &Student) -> StoreResult<StudentId> {
        self.conn.execute(
            "INSERT INTO students (uuid, name, is_active) VALUES (?1, ?2, ?3);",
            params![
                student.id.to_string(),
                student.name.trim(),
                bool_to_int(student.active),
            ],
        )?;
        Ok(student.id)
    }

    pub fn set_active(&self, id: StudentId, active: bool) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE students SET is_active = ?1 WHERE uuid = ?2;",
            params![bool_to_int(active), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

impl StudentDirectory for SqliteStudentDirectory<'_> {
    fn get(&self, id: StudentId) -> StoreResult<Option<Student>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, name, is_active FROM students WHERE uuid = ?1;")?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_student_row(row)?));
        }
        Ok(None)
    }

    fn list_active(&self) -> StoreResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, name, is_active
             FROM students
             WHERE is_active = 1
             ORDER BY name COLLATE NOCASE ASC, uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut students = Vec::new();
        while let Some(row) = rows.next()? {
            students.push(parse_student_row(row)?);
        }
        Ok(students)
    }
}

fn parse_student_row(row: &Row<'_>) -> StoreResult<Student> {
    let uuid_text: String = row.get("uuid")?;
    let active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_active value `{other}` in students.is_active"
            )));
        }
    };
    Ok(Student {
        id: parse_uuid(&uuid_text, "students.uuid")?,
        name: row.get("name")?,
        active,
    })
}
