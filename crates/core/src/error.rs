//! Error types for the dispatch core.
//!
//! `NotFound` is a normal control-flow outcome for callers (an unknown patient, a hospital set
//! that is empty). `Store` and `InvariantViolation` are operational failures. A request that
//! finds no free ambulance is not an error at all; see [`crate::dispatch::Assignment`].

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    pub(crate) fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        CoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Returns `true` for failures that a caller may sensibly retry once.
    pub fn is_serialization_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::Store(StoreError {
                kind: StoreErrorKind::Busy(_) | StoreErrorKind::Conflict(_),
                ..
            })
        )
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Failure raised by the persistence layer, tagged with the query that produced it.
#[derive(Debug, thiserror::Error)]
#[error("store error in {query}: {kind}")]
pub struct StoreError {
    pub query: &'static str,
    #[source]
    pub kind: StoreErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreErrorKind {
    /// The database was locked by another writer for longer than the busy timeout.
    #[error("database busy: {0}")]
    Busy(String),
    /// A compare-and-set update matched no row because a concurrent writer got there first.
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("could not decode stored value: {0}")]
    Decode(String),
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn new(query: &'static str, kind: StoreErrorKind) -> Self {
        Self { query, kind }
    }

    pub(crate) fn sqlite(query: &'static str, err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let kind = match &err {
            rusqlite::Error::SqliteFailure(code, _) => match code.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    StoreErrorKind::Busy(err.to_string())
                }
                ErrorCode::ConstraintViolation => StoreErrorKind::Constraint(err.to_string()),
                _ => StoreErrorKind::Backend(err.to_string()),
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => {
                StoreErrorKind::Decode(err.to_string())
            }
            _ => StoreErrorKind::Backend(err.to_string()),
        };

        Self { query, kind }
    }
}
