//! Shared store error type.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence failure reported by any store implementation.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// Mutation targeted an unknown record.
    NotFound(Uuid),
    /// Persisted row cannot be mapped back to a domain record.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
