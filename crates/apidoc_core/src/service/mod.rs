//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Enforce authentication and access checks before touching storage.
//! - Keep the request surface decoupled from storage details.
//!
//! # Invariants
//! - Services never open transactions; the request surface wraps each
//!   mutating call in one.

pub mod entity_service;
pub mod lock_service;

use crate::model::entity::EntityId;
use crate::model::user::UserId;
use crate::repo::entity_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Caller identity resolved by the session layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<UserId>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    /// Returns the logged-in user or `NotAuthenticated`.
    pub fn require_user(&self) -> Result<UserId, ServiceError> {
        self.user_id.ok_or(ServiceError::NotAuthenticated)
    }
}

/// Errors surfaced by use-case services.
#[derive(Debug)]
pub enum ServiceError {
    /// Required request field is absent or empty.
    MissingParameter(&'static str),
    /// Request field is present but malformed.
    InvalidParameter { name: &'static str, value: String },
    EntityNotFound(EntityId),
    /// No session identity.
    NotAuthenticated,
    /// Access check failed.
    AccessDenied,
    /// Unlock attempted by someone other than the lock owner.
    NotLockOwner { entity_id: EntityId },
    /// Move request carried an unknown operation code.
    InvalidMoveOp(i64),
    Repo(RepoError),
    Serialization(serde_json::Error),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingParameter(name) => write!(f, "missing required parameter `{name}`"),
            Self::InvalidParameter { name, value } => {
                write!(f, "invalid value `{value}` for parameter `{name}`")
            }
            Self::EntityNotFound(id) => write!(f, "no entity found with id {id}"),
            Self::NotAuthenticated => write!(f, "not logged in"),
            Self::AccessDenied => write!(f, "access denied"),
            Self::NotLockOwner { entity_id } => write!(
                f,
                "you did not lock entity {entity_id} and cannot unlock it; refresh the page"
            ),
            Self::InvalidMoveOp(op) => write!(f, "unsupported move operation `{op}`"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "failed to serialize response: {err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
