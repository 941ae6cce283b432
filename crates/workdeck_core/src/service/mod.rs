//! Core use-case services.
//!
//! # Responsibility
//! - Gate every operation through the authorization evaluator.
//! - Orchestrate repository calls into use-case level APIs.
//! - Invalidate listing cache keys whose underlying rows were mutated.
//! - Hand typed domain events back to the caller for post-commit fan-out.
//!
//! # Invariants
//! - Business-rule violations are rejected before any mutation.
//! - Services never schedule outbound messages themselves; that is the
//!   dispatcher's job after the triggering transaction committed.

use crate::blob::BlobError;
use crate::cache::{remember, Cache, LISTING_TTL};
use crate::policy::Access;
use crate::repo::{RepoError, RepoResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod attachment_service;
pub mod comment_service;
pub mod notification_service;
pub mod project_service;
pub mod task_service;
pub mod team_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Client-facing error taxonomy shared by all services.
#[derive(Debug)]
pub enum ServiceError {
    /// The caller lacks the role/edge required for the action. Carries the
    /// evaluator's human-readable reason.
    Forbidden(String),
    /// A transfer target does not satisfy the membership precondition.
    NotEligible(String),
    /// An edge mutation would create a second accountable-role holder.
    RoleConflict(String),
    /// An edge mutation would break a structural invariant.
    InvariantViolation(String),
    /// The transfer target already holds the role.
    NoOpTransfer(Uuid),
    /// A referenced entity does not exist.
    NotFound { what: &'static str, id: Uuid },
    /// Infrastructure failure in the persistence layer.
    Repo(RepoError),
    /// Infrastructure failure in the blob store.
    Blob(BlobError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forbidden(reason) => write!(f, "{reason}"),
            Self::NotEligible(message) => write!(f, "{message}"),
            Self::RoleConflict(message) => write!(f, "{message}"),
            Self::InvariantViolation(message) => write!(f, "{message}"),
            Self::NoOpTransfer(holder) => {
                write!(f, "principal {holder} already holds the role")
            }
            Self::NotFound { what, id } => write!(f, "{what} not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Blob(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Blob(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { what, id } => Self::NotFound { what, id },
            RepoError::NotEligible(message) => Self::NotEligible(message),
            RepoError::NoOpTransfer(holder) => Self::NoOpTransfer(holder),
            RepoError::RoleConflict(message) => Self::RoleConflict(message),
            RepoError::InvariantViolation(message) => Self::InvariantViolation(message),
            other => Self::Repo(other),
        }
    }
}

impl From<BlobError> for ServiceError {
    fn from(value: BlobError) -> Self {
        Self::Blob(value)
    }
}

/// Converts an evaluator outcome into the service taxonomy.
pub(crate) fn ensure_allowed(access: Access) -> ServiceResult<()> {
    match access {
        Access::Allow => Ok(()),
        Access::Deny(reason) => Err(ServiceError::Forbidden(reason)),
    }
}

/// Reads one listing through the cache, serializing it as JSON text.
pub(crate) fn cached_list<T, C, F>(cache: &C, key: &str, producer: F) -> ServiceResult<Vec<T>>
where
    T: Serialize + DeserializeOwned,
    C: Cache,
    F: FnOnce() -> RepoResult<Vec<T>>,
{
    let json = remember(cache, key, LISTING_TTL, || -> ServiceResult<String> {
        let items = producer()?;
        serde_json::to_string(&items).map_err(|err| {
            ServiceError::Repo(RepoError::InvalidData(format!(
                "listing does not serialize: {err}"
            )))
        })
    })?;
    serde_json::from_str(&json).map_err(|err| {
        ServiceError::Repo(RepoError::InvalidData(format!(
            "cached listing does not deserialize: {err}"
        )))
    })
}
