//! Student reference model.
//!
//! Students are owned outside the scheduling/ledger core. The core only needs
//! a stable id, a display name for reporting and the active flag for rollover.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque student identifier referenced by sessions and movements.
pub type StudentId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    /// Inactive students are skipped by monthly rollover.
    pub active: bool,
}

impl Student {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            active: true,
        }
    }
}
