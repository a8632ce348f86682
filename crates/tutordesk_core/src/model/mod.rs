//! Domain model for the tutoring calendar and ledger.
//!
//! # Responsibility
//! - Define canonical records used by scheduling and ledger services.
//! - Keep closed sum types (`SessionStatus`, `MovementKind`,
//!   `MovementOrigin`) so every consumer matches exhaustively.
//!
//! # Invariants
//! - Every session and movement is identified by a stable UUID.
//! - All times are local wall-clock values without timezone.

pub mod month;
pub mod movement;
pub mod session;
pub mod slot;
pub mod student;
