//! Wall-clock abstraction for month-boundary decisions.

use chrono::{Local, NaiveDate};
use std::cell::Cell;

/// Source of "today" in local wall-clock time.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// Reads the process local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Clone)]
pub struct FixedClock {
    today: Cell<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Cell::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        self.today.set(today);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}
