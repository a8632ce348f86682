//! Store contracts consumed by the core and their SQLite implementations.
//!
//! # Responsibility
//! - Define the narrow session/movement/student/marker store interfaces.
//! - Isolate SQL details from scheduling and ledger services.
//!
//! # Invariants
//! - Stores return semantic errors (`NotFound`) next to transport errors.
//! - Successful writes publish a typed change event; failed writes do not.

pub mod error;
pub mod marker_repo;
pub mod movement_repo;
pub mod session_repo;
pub mod student_repo;

pub(crate) mod codec;
