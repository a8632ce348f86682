//! Ledger movement model.
//!
//! # Responsibility
//! - Define debt/payment records and their creation request.
//! - Derive month keys from movement dates.
//!
//! # Invariants
//! - `amount > 0`; direction comes from `kind`, never from the sign.
//! - Movements are immutable once stored; correction is delete + re-create.
//! - At most one carryover movement exists per student and month.

use crate::model::month::MonthKey;
use crate::model::student::StudentId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one ledger movement.
pub type MovementId = Uuid;

/// Direction of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Amount the student owes (class fee, carried balance).
    Debt,
    /// Amount the student paid.
    Payment,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debt => "debt",
            Self::Payment => "payment",
        }
    }

    /// Parses free-form kind input (`debt` / `payment`, case-insensitive).
    pub fn parse(value: &str) -> Result<Self, MovementValidationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debt" => Ok(Self::Debt),
            "payment" => Ok(Self::Payment),
            other => Err(MovementValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Where a movement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MovementOrigin {
    /// Entered by a user.
    Manual,
    /// Created by monthly rollover from the unpaid balance of `from`.
    Carryover { from: MonthKey },
}

/// Validation failures for new movements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovementValidationError {
    NonPositiveAmount(i64),
    MissingStudent,
    UnknownKind(String),
}

impl Display for MovementValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveAmount(amount) => {
                write!(f, "movement amount must be positive, got {amount}")
            }
            Self::MissingStudent => write!(f, "movement must reference a student"),
            Self::UnknownKind(value) => {
                write!(f, "unknown movement kind `{value}`; expected debt|payment")
            }
        }
    }
}

impl Error for MovementValidationError {}

/// Persisted ledger movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub student_id: StudentId,
    pub date: NaiveDate,
    pub kind: MovementKind,
    /// Minor currency units, always positive.
    pub amount: i64,
    pub note: Option<String>,
    /// Who paid, when it was not the student.
    pub payer: Option<String>,
    pub month_key: MonthKey,
    pub origin: MovementOrigin,
}

impl Movement {
    /// Contribution to a pending balance: debts add, payments subtract.
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            MovementKind::Debt => self.amount,
            MovementKind::Payment => -self.amount,
        }
    }

    pub fn is_carryover(&self) -> bool {
        matches!(self.origin, MovementOrigin::Carryover { .. })
    }

    pub fn validate(&self) -> Result<(), MovementValidationError> {
        if self.amount <= 0 {
            return Err(MovementValidationError::NonPositiveAmount(self.amount));
        }
        Ok(())
    }
}

/// Creation request for a movement.
///
/// `student_id` stays optional because requests are assembled from form
/// input; validation rejects a missing reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub student_id: Option<StudentId>,
    pub date: NaiveDate,
    pub kind: MovementKind,
    pub amount: i64,
    pub note: Option<String>,
    pub payer: Option<String>,
    /// Derived from `date` when absent.
    pub month_key: Option<MonthKey>,
    pub origin: MovementOrigin,
}

impl NewMovement {
    pub fn new(student_id: StudentId, date: NaiveDate, kind: MovementKind, amount: i64) -> Self {
        Self {
            student_id: Some(student_id),
            date,
            kind,
            amount,
            note: None,
            payer: None,
            month_key: None,
            origin: MovementOrigin::Manual,
        }
    }

    pub fn debt(student_id: StudentId, date: NaiveDate, amount: i64) -> Self {
        Self::new(student_id, date, MovementKind::Debt, amount)
    }

    pub fn payment(student_id: StudentId, date: NaiveDate, amount: i64) -> Self {
        Self::new(student_id, date, MovementKind::Payment, amount)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    pub fn carried_from(mut self, from: MonthKey) -> Self {
        self.origin = MovementOrigin::Carryover { from };
        self
    }

    /// Validates the request and builds the persisted record with a new id.
    pub fn into_movement(self) -> Result<Movement, MovementValidationError> {
        let student_id = self
            .student_id
            .ok_or(MovementValidationError::MissingStudent)?;
        let movement = Movement {
            id: Uuid::new_v4(),
            student_id,
            date: self.date,
            kind: self.kind,
            amount: self.amount,
            note: non_blank(self.note),
            payer: non_blank(self.payer),
            month_key: self
                .month_key
                .unwrap_or_else(|| MonthKey::from_date(self.date)),
            origin: self.origin,
        };
        movement.validate()?;
        Ok(movement)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
