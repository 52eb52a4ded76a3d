//! Property domain model.
//!
//! # Responsibility
//! - Define fields that belong to an entity's request or response shape.
//! - Expose the parent linkage consumed by the tree builder.
//!
//! # Invariants
//! - Properties of one `(entity_id, scope)` form a forest keyed by `parent_id`.
//! - `parent_id = None` marks a root property.

use super::entity::EntityId;
use super::EpochMillis;
use crate::tree::literal::{is_regexp_literal, ExtendedValue, ToExtended};
use crate::tree::TreeNode;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type PropertyId = i64;

/// Which payload shape a property belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyScope {
    Request,
    Response,
}

impl PropertyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "request" => Some(Self::Request),
            "response" => Some(Self::Response),
            _ => None,
        }
    }
}

/// Declared value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Function,
    RegExp,
    Null,
}

impl PropertyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Object => "Object",
            Self::Array => "Array",
            Self::Function => "Function",
            Self::RegExp => "RegExp",
            Self::Null => "Null",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "String" => Some(Self::String),
            "Number" => Some(Self::Number),
            "Boolean" => Some(Self::Boolean),
            "Object" => Some(Self::Object),
            "Array" => Some(Self::Array),
            "Function" => Some(Self::Function),
            "RegExp" => Some(Self::RegExp),
            "Null" => Some(Self::Null),
            _ => None,
        }
    }
}

/// Where a request parameter travels. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamPosition {
    Headers,
    QueryParams,
    BodyParams,
}

impl ParamPosition {
    pub fn code(self) -> u8 {
        match self {
            Self::Headers => 1,
            Self::QueryParams => 2,
            Self::BodyParams => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Headers),
            2 => Some(Self::QueryParams),
            3 => Some(Self::BodyParams),
            _ => None,
        }
    }
}

impl Serialize for ParamPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ParamPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("invalid parameter position `{code}`")))
    }
}

/// Persisted property record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: PropertyId,
    pub entity_id: EntityId,
    pub scope: PropertyScope,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub pos: Option<ParamPosition>,
    pub name: String,
    pub rule: Option<String>,
    /// Default value source text. For `Function`/`RegExp` types this is the
    /// literal's source, not a JSON value.
    pub value: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<PropertyId>,
    /// Sibling ordering key.
    pub priority: i64,
    pub required: bool,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

impl Property {
    /// Renders `value` as an extended literal when the declared type calls
    /// for one and the text has the expected shape.
    fn value_literal(&self) -> ExtendedValue {
        match (&self.value, self.kind) {
            (None, _) => ExtendedValue::Null,
            (Some(text), PropertyType::RegExp) if is_regexp_literal(text) => {
                ExtendedValue::RegExp(text.clone())
            }
            (Some(text), PropertyType::Function) if !text.trim().is_empty() => {
                ExtendedValue::Function(text.clone())
            }
            (Some(text), _) => ExtendedValue::String(text.clone()),
        }
    }
}

impl TreeNode for Property {
    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }
}

impl ToExtended for Property {
    fn to_extended(&self) -> ExtendedValue {
        ExtendedValue::object([
            ("id", ExtendedValue::from(self.id)),
            ("entityId", ExtendedValue::from(self.entity_id)),
            ("scope", ExtendedValue::from(self.scope.as_str())),
            ("type", ExtendedValue::from(self.kind.as_str())),
            (
                "pos",
                self.pos
                    .map_or(ExtendedValue::Null, |pos| ExtendedValue::from(i64::from(pos.code()))),
            ),
            ("name", ExtendedValue::from(self.name.as_str())),
            ("rule", ExtendedValue::from(self.rule.as_deref())),
            ("value", self.value_literal()),
            ("description", ExtendedValue::from(self.description.as_deref())),
            (
                "parentId",
                self.parent_id.map_or(ExtendedValue::Null, ExtendedValue::from),
            ),
            ("priority", ExtendedValue::from(self.priority)),
            ("required", ExtendedValue::Bool(self.required)),
            ("createdAt", ExtendedValue::from(self.created_at)),
            ("updatedAt", ExtendedValue::from(self.updated_at)),
        ])
    }
}

/// Create payload for one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProperty {
    pub entity_id: EntityId,
    pub scope: PropertyScope,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default)]
    pub pos: Option<ParamPosition>,
    pub name: String,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<PropertyId>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub required: bool,
}

impl NewProperty {
    pub fn new(
        entity_id: EntityId,
        scope: PropertyScope,
        kind: PropertyType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            scope,
            kind,
            pos: None,
            name: name.into(),
            rule: None,
            value: None,
            description: None,
            parent_id: None,
            priority: 0,
            required: false,
        }
    }

    pub fn with_parent(mut self, parent_id: PropertyId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Copies every field of `source` except identity and timestamps.
    pub fn copy_of(source: &Property, entity_id: EntityId, parent_id: Option<PropertyId>) -> Self {
        Self {
            entity_id,
            scope: source.scope,
            kind: source.kind,
            pos: source.pos,
            name: source.name.clone(),
            rule: source.rule.clone(),
            value: source.value.clone(),
            description: source.description.clone(),
            parent_id,
            priority: source.priority,
            required: source.required,
        }
    }
}
