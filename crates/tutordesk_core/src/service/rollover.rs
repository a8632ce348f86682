//! Once-per-month carryover of unpaid balances.
//!
//! # Responsibility
//! - Decide from the local marker whether this month's rollover already ran.
//! - Turn each active student's positive pending balance of the previous
//!   month into a debt dated the first day of the current month.
//!
//! # Invariants
//! - The marker is written only after every student was processed.
//! - At most one carryover exists per student and month: a student that
//!   already has one is skipped, so a run interrupted before the marker
//!   write never duplicates debt when it is repeated.
//! - Students with zero or negative pending get no movement.

use crate::clock::Clock;
use crate::model::month::MonthKey;
use crate::model::movement::{MovementId, NewMovement};
use crate::model::student::StudentId;
use crate::repo::error::StoreError;
use crate::repo::marker_repo::RolloverMarkerStore;
use crate::repo::movement_repo::MovementStore;
use crate::repo::student_repo::StudentDirectory;
use crate::service::ledger::{LedgerEngine, LedgerError};
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum RolloverError {
    Ledger(LedgerError),
    Store(StoreError),
}

impl Display for RolloverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(err) => write!(f, "rollover ledger step failed: {err}"),
            Self::Store(err) => write!(f, "rollover marker step failed: {err}"),
        }
    }
}

impl Error for RolloverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<LedgerError> for RolloverError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<StoreError> for RolloverError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Rollover state for the current calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverState {
    Pending(MonthKey),
    Done(MonthKey),
}

/// One balance moved into the current month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarriedBalance {
    pub student_id: StudentId,
    pub amount: i64,
    pub movement_id: MovementId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverReport {
    /// Month that received the carryovers.
    pub month: MonthKey,
    /// Month whose balances were carried.
    pub from: MonthKey,
    pub carried: Vec<CarriedBalance>,
    /// Students skipped because a carryover already existed.
    pub already_carried: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloverOutcome {
    AlreadyDone(MonthKey),
    Completed(RolloverReport),
}

pub struct RolloverScheduler<'l, M, D, K, C>
where
    M: MovementStore,
    D: StudentDirectory,
    K: RolloverMarkerStore,
    C: Clock,
{
    ledger: &'l LedgerEngine<M, D>,
    marker: K,
    clock: C,
}

impl<'l, M, D, K, C> RolloverScheduler<'l, M, D, K, C>
where
    M: MovementStore,
    D: StudentDirectory,
    K: RolloverMarkerStore,
    C: Clock,
{
    pub fn new(ledger: &'l LedgerEngine<M, D>, marker: K, clock: C) -> Self {
        Self {
            ledger,
            marker,
            clock,
        }
    }

    pub fn current_month(&self) -> MonthKey {
        MonthKey::from_date(self.clock.today())
    }

    pub fn state(&self) -> Result<RolloverState, RolloverError> {
        let current = self.current_month();
        Ok(match self.marker.read()? {
            Some(done) if done == current => RolloverState::Done(current),
            _ => RolloverState::Pending(current),
        })
    }

    /// Runs the carryover when the marker differs from the current month.
    ///
    /// # Errors
    /// Store and ledger failures propagate; the marker then stays unchanged
    /// and the next start retries.
    pub fn run_if_due(&self) -> Result<RolloverOutcome, RolloverError> {
        let current = match self.state()? {
            RolloverState::Done(month) => {
                debug!("event=rollover module=rollover status=skipped month={month}");
                return Ok(RolloverOutcome::AlreadyDone(month));
            }
            RolloverState::Pending(month) => month,
        };

        let previous = current.previous();
        let pending = self
            .ledger
            .pending_by_student_between(previous.first_day(), previous.last_day())?;

        let mut report = RolloverReport {
            month: current,
            from: previous,
            carried: Vec::new(),
            already_carried: 0,
        };

        for student in self.ledger.students().list_active()? {
            let amount = pending.get(&student.id).copied().unwrap_or(0);
            if amount <= 0 {
                continue;
            }
            // Carried before an interrupted run; the marker was never written.
            if self.ledger.has_carryover(student.id, current)? {
                report.already_carried += 1;
                continue;
            }

            let movement = self.ledger.add_movement(
                NewMovement::debt(student.id, current.first_day(), amount)
                    .with_note(format!("Carried-over balance from {previous}"))
                    .carried_from(previous),
            )?;
            report.carried.push(CarriedBalance {
                student_id: student.id,
                amount,
                movement_id: movement.id,
            });
        }

        // Only after every student is settled.
        self.marker.write(current)?;
        info!(
            "event=rollover module=rollover status=ok month={} from={} carried={} already_carried={}",
            current,
            previous,
            report.carried.len(),
            report.already_carried
        );
        Ok(RolloverOutcome::Completed(report))
    }
}
