//! Audit trail records written after entity mutations.

use super::entity::{EntityId, ModuleId, RepositoryId};
use super::user::UserId;
use super::EpochMillis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Create,
    Update,
    Delete,
}

impl AuditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One mutation to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub user_id: Option<UserId>,
    pub kind: AuditKind,
    pub repository_id: Option<RepositoryId>,
    pub module_id: Option<ModuleId>,
    pub entity_id: Option<EntityId>,
}

/// Persisted audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// Stable id for cross-system correlation.
    pub uuid: Uuid,
    pub user_id: Option<UserId>,
    #[serde(rename = "type")]
    pub kind: AuditKind,
    pub repository_id: Option<RepositoryId>,
    pub module_id: Option<ModuleId>,
    pub entity_id: Option<EntityId>,
    pub created_at: EpochMillis,
}
