//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//! - Enforce structural graph invariants at the storage boundary, inside
//!   the same transaction as the edge writes they protect.
//!
//! # Invariants
//! - Edge mutations and role-directory reconciliation commit atomically.
//! - Repository APIs return semantic errors (`NotFound`, `RoleConflict`,
//!   `InvariantViolation`) in addition to DB transport errors.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod attachment_repo;
pub mod comment_repo;
pub mod directory_repo;
pub mod notification_repo;
pub mod project_repo;
pub mod task_repo;
pub mod team_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Shared repository error for persistence and graph-invariant failures.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Referenced row does not exist.
    NotFound { what: &'static str, id: Uuid },
    /// A transfer target does not satisfy the membership precondition.
    NotEligible(String),
    /// A transfer target already holds the accountable role.
    NoOpTransfer(Uuid),
    /// An edge mutation would create a second accountable-role holder.
    RoleConflict(String),
    /// An edge mutation would break a structural invariant.
    InvariantViolation(String),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { what, id } => write!(f, "{what} not found: {id}"),
            Self::NotEligible(message) => write!(f, "{message}"),
            Self::NoOpTransfer(holder) => {
                write!(f, "principal {holder} already holds the role")
            }
            Self::RoleConflict(message) => write!(f, "{message}"),
            Self::InvariantViolation(message) => write!(f, "{message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
