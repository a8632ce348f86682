//! Core use-case services.
//!
//! # Responsibility
//! - Enforce scheduling capacity and ledger rules above the store traits.
//! - Keep callers decoupled from storage details.

pub mod ledger;
pub mod recurrence;
pub mod rollover;
pub mod slot_calendar;
