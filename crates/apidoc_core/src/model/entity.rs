//! Entity domain model.
//!
//! # Responsibility
//! - Define the documented data-structure record and its write shapes.
//! - Validate user-supplied fields before they reach storage.
//!
//! # Invariants
//! - `locker_id` is either `None` (unlocked) or the id of an existing user.
//! - `deleted_at` is the source of truth for tombstone state.
//! - `name` is never blank and neither `name` nor `namespace` exceed
//!   [`MAX_NAME_CHARS`].

use super::user::UserId;
use super::EpochMillis;
use crate::tree::literal::{ExtendedValue, ToExtended};
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EntityId = i64;
pub type RepositoryId = i64;
pub type ModuleId = i64;

/// Column width for `name` and `namespace`.
pub const MAX_NAME_CHARS: usize = 256;

/// Category of a documented data structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Struct,
    Exception,
    Union,
}

impl EntityKind {
    /// Stable storage/wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Struct => "struct",
            Self::Exception => "exception",
            Self::Union => "union",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "struct" => Some(Self::Struct),
            "exception" => Some(Self::Exception),
            "union" => Some(Self::Union),
            _ => None,
        }
    }
}

/// Persisted entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    /// Serialized as `type` to match external schema naming.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub name: String,
    pub namespace: String,
    pub description: Option<String>,
    pub creator_id: Option<UserId>,
    /// Advisory edit lock owner. `None` means unlocked.
    pub locker_id: Option<UserId>,
    pub repository_id: RepositoryId,
    pub module_id: ModuleId,
    /// Ordering key, stamped with the creation time.
    pub priority: i64,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
    pub deleted_at: Option<EpochMillis>,
}

impl Entity {
    /// Returns whether this entity is visible (not tombstoned).
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl ToExtended for Entity {
    fn to_extended(&self) -> ExtendedValue {
        let optional_int =
            |value: Option<i64>| value.map_or(ExtendedValue::Null, ExtendedValue::from);
        ExtendedValue::object([
            ("id", ExtendedValue::from(self.id)),
            ("type", ExtendedValue::from(self.kind.as_str())),
            ("name", ExtendedValue::from(self.name.as_str())),
            ("namespace", ExtendedValue::from(self.namespace.as_str())),
            ("description", ExtendedValue::from(self.description.as_deref())),
            ("creatorId", optional_int(self.creator_id)),
            ("lockerId", optional_int(self.locker_id)),
            ("repositoryId", ExtendedValue::from(self.repository_id)),
            ("moduleId", ExtendedValue::from(self.module_id)),
            ("priority", ExtendedValue::from(self.priority)),
            ("createdAt", ExtendedValue::from(self.created_at)),
            ("updatedAt", ExtendedValue::from(self.updated_at)),
            ("deletedAt", optional_int(self.deleted_at)),
        ])
    }
}

/// Create payload.
///
/// `creator_id` and `priority` are never read from request bodies; the
/// service stamps them from the session and the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    pub repository_id: RepositoryId,
    pub module_id: ModuleId,
    #[serde(skip)]
    pub creator_id: Option<UserId>,
    #[serde(skip)]
    pub priority: i64,
}

impl NewEntity {
    pub fn new(
        kind: EntityKind,
        name: impl Into<String>,
        repository_id: RepositoryId,
        module_id: ModuleId,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: String::new(),
            description: None,
            repository_id,
            module_id,
            creator_id: None,
            priority: 0,
        }
    }

    pub fn validate(&self) -> Result<(), EntityValidationError> {
        validate_name(&self.name)?;
        validate_namespace(&self.namespace)
    }
}

/// Partial update payload. `None` fields are left untouched.
///
/// `description` is the one nullable field: an absent key leaves it alone,
/// while `"description": null` clears it (`Some(None)`).
///
/// The lock owner and creator are deliberately absent: they change only
/// through the lock protocol and creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    pub id: EntityId,
    #[serde(default, rename = "type")]
    pub kind: Option<EntityKind>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub repository_id: Option<RepositoryId>,
    #[serde(default)]
    pub module_id: Option<ModuleId>,
}

impl EntityPatch {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(namespace) = &self.namespace {
            validate_namespace(namespace)?;
        }
        Ok(())
    }
}

/// Maps a present key to `Some`, keeping an explicit `null` as `Some(None)`.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Field-level validation failures for entity writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValidationError {
    BlankName,
    NameTooLong(usize),
    NamespaceTooLong(usize),
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "entity name must not be blank"),
            Self::NameTooLong(len) => write!(
                f,
                "entity name has {len} characters; at most {MAX_NAME_CHARS} are allowed"
            ),
            Self::NamespaceTooLong(len) => write!(
                f,
                "entity namespace has {len} characters; at most {MAX_NAME_CHARS} are allowed"
            ),
        }
    }
}

impl Error for EntityValidationError {}

fn validate_name(name: &str) -> Result<(), EntityValidationError> {
    if name.trim().is_empty() {
        return Err(EntityValidationError::BlankName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_CHARS {
        return Err(EntityValidationError::NameTooLong(len));
    }
    Ok(())
}

fn validate_namespace(namespace: &str) -> Result<(), EntityValidationError> {
    let len = namespace.chars().count();
    if len > MAX_NAME_CHARS {
        return Err(EntityValidationError::NamespaceTooLong(len));
    }
    Ok(())
}
