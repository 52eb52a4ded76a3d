//! Documentation repositories and their modules.
//!
//! # Invariants
//! - A repository is the unit of access control; modules inherit it.

use super::entity::{ModuleId, RepositoryId};
use super::user::UserId;
use super::EpochMillis;
use serde::{Deserialize, Serialize};

/// Read visibility of a documentation repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Anyone may read.
    Public,
    /// Only the owner and members may read.
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// A documentation repository: the unit of access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    pub owner_id: UserId,
    pub visibility: Visibility,
    pub created_at: EpochMillis,
}

/// A named group of entities inside one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: ModuleId,
    pub repository_id: RepositoryId,
    pub name: String,
    pub priority: i64,
}
