//! Ledger use-case service.
//!
//! # Responsibility
//! - Validate and persist debt/payment movements.
//! - Derive per-student, per-month pending balances and reporting rows.
//!
//! # Invariants
//! - `pending = Σdebt − Σpayment`; it may be negative (overpayment).
//! - Aggregates are order-independent over the movement list.
//! - Store failures propagate unchanged inside `LedgerError::Store`.

use crate::model::month::{MonthKey, MonthRange};
use crate::model::movement::{
    Movement, MovementId, MovementKind, MovementValidationError, NewMovement,
};
use crate::model::student::{Student, StudentId};
use crate::repo::error::StoreError;
use crate::repo::movement_repo::MovementStore;
use crate::repo::student_repo::StudentDirectory;
use chrono::NaiveDate;
use log::info;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug)]
pub enum LedgerError {
    Validation(MovementValidationError),
    NotFound(MovementId),
    /// Sum of a student's amounts does not fit in `i64` minor units.
    AmountOverflow(StudentId),
    Store(StoreError),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "movement not found: {id}"),
            Self::AmountOverflow(student_id) => {
                write!(f, "amount total overflows for student {student_id}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::NotFound(_) | Self::AmountOverflow(_) => None,
        }
    }
}

impl From<MovementValidationError> for LedgerError {
    fn from(value: MovementValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Debt/payment sums for one student over a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthlyTotals {
    pub debt: i64,
    pub payment: i64,
    pub pending: i64,
}

impl MonthlyTotals {
    fn add(&mut self, movement: &Movement) -> Result<(), LedgerError> {
        let overflow = || LedgerError::AmountOverflow(movement.student_id);
        match movement.kind {
            MovementKind::Debt => {
                self.debt = self.debt.checked_add(movement.amount).ok_or_else(overflow)?;
            }
            MovementKind::Payment => {
                self.payment = self
                    .payment
                    .checked_add(movement.amount)
                    .ok_or_else(overflow)?;
            }
        }
        self.pending = self.debt.checked_sub(self.payment).ok_or_else(overflow)?;
        Ok(())
    }

    pub fn had_activity(&self) -> bool {
        self.debt != 0 || self.payment != 0
    }
}

/// Reporting row for one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentMonthlyTotals {
    pub student_id: StudentId,
    pub name: String,
    pub totals: MonthlyTotals,
}

/// Ledger service over injected movement store and student directory.
pub struct LedgerEngine<M: MovementStore, D: StudentDirectory> {
    movements: M,
    students: D,
}

impl<M: MovementStore, D: StudentDirectory> LedgerEngine<M, D> {
    pub fn new(movements: M, students: D) -> Self {
        Self {
            movements,
            students,
        }
    }

    pub fn movement_store(&self) -> &M {
        &self.movements
    }

    pub fn students(&self) -> &D {
        &self.students
    }

    /// Validates and stores one movement.
    ///
    /// # Errors
    /// - `Validation` when the amount is not positive or the student is absent.
    /// - `Store` when persistence fails.
    pub fn add_movement(&self, request: NewMovement) -> Result<Movement, LedgerError> {
        let movement = request.into_movement()?;
        self.movements.create(&movement)?;
        info!(
            "event=movement_add module=ledger status=ok movement_id={} kind={} month={} carryover={}",
            movement.id,
            movement.kind.as_str(),
            movement.month_key,
            movement.is_carryover()
        );
        Ok(movement)
    }

    pub fn remove_movement(&self, id: MovementId) -> Result<(), LedgerError> {
        self.movements.delete(id)?;
        info!("event=movement_remove module=ledger status=ok movement_id={id}");
        Ok(())
    }

    /// Pending balance for one student over months in `range`.
    pub fn monthly_totals(
        &self,
        student_id: StudentId,
        range: MonthRange,
    ) -> Result<MonthlyTotals, LedgerError> {
        let movements = self.movements.list()?;
        totals_for(
            movements
                .iter()
                .filter(|m| m.student_id == student_id && range.contains(m.month_key)),
        )
    }

    /// Per-student rows with activity in `range`.
    ///
    /// Sorted by pending descending, then by name. Movements of students the
    /// directory cannot resolve are left out.
    pub fn all_students_monthly_totals(
        &self,
        range: MonthRange,
    ) -> Result<Vec<StudentMonthlyTotals>, LedgerError> {
        let movements = self.movements.list()?;
        let mut grouped: HashMap<StudentId, MonthlyTotals> = HashMap::new();
        for movement in movements.iter().filter(|m| range.contains(m.month_key)) {
            grouped
                .entry(movement.student_id)
                .or_default()
                .add(movement)?;
        }

        let mut rows = Vec::with_capacity(grouped.len());
        for (student_id, totals) in grouped {
            if !totals.had_activity() {
                continue;
            }
            let Some(Student { name, .. }) = self.students.get(student_id)? else {
                continue;
            };
            rows.push(StudentMonthlyTotals {
                student_id,
                name,
                totals,
            });
        }

        rows.sort_by(|a, b| {
            b.totals
                .pending
                .cmp(&a.totals.pending)
                .then_with(|| compare_names(&a.name, &b.name))
                .then_with(|| a.student_id.cmp(&b.student_id))
        });
        Ok(rows)
    }

    /// Statement lines for one student, ordered by date.
    pub fn movements_for(
        &self,
        student_id: StudentId,
        range: MonthRange,
    ) -> Result<Vec<Movement>, LedgerError> {
        let mut movements: Vec<Movement> = self
            .movements
            .list()?
            .into_iter()
            .filter(|m| m.student_id == student_id && range.contains(m.month_key))
            .collect();
        movements.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(movements)
    }

    /// Pending balance per student over movements dated within `[from, to]`.
    pub fn pending_by_student_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<StudentId, i64>, LedgerError> {
        let mut pending: HashMap<StudentId, i64> = HashMap::new();
        for movement in self.movements.list()? {
            if movement.date < from || movement.date > to {
                continue;
            }
            let balance = pending.entry(movement.student_id).or_insert(0);
            *balance = balance
                .checked_add(movement.signed_amount())
                .ok_or(LedgerError::AmountOverflow(movement.student_id))?;
        }
        Ok(pending)
    }

    pub fn has_carryover(
        &self,
        student_id: StudentId,
        month: MonthKey,
    ) -> Result<bool, LedgerError> {
        Ok(self.movements.has_carryover(student_id, month)?)
    }
}

fn totals_for<'a>(
    movements: impl Iterator<Item = &'a Movement>,
) -> Result<MonthlyTotals, LedgerError> {
    let mut totals = MonthlyTotals::default();
    for movement in movements {
        totals.add(movement)?;
    }
    Ok(totals)
}

/// Locale-aware name order: base letters first, then accents, then case.
///
/// Approximates root collation: `Álvaro` sorts with the `A`s and `Ñ` with
/// the `N`s; accents only break ties between otherwise equal names.
fn compare_names(a: &str, b: &str) -> Ordering {
    base_letters(a)
        .cmp(&base_letters(b))
        .then_with(|| folded(a).cmp(&folded(b)))
        .then_with(|| a.cmp(b))
}

fn base_letters(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn folded(name: &str) -> String {
    name.trim().nfc().collect::<String>().to_lowercase()
}
