//! Property repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist entity-owned properties.
//! - List properties in deterministic sibling order.
//!
//! # Invariants
//! - Listing order is `priority ASC, id ASC`.
//! - Properties are deleted physically, never tombstoned.

use super::entity_repo::{RepoError, RepoResult};
use super::int_to_bool;
use crate::model::entity::EntityId;
use crate::model::property::{NewProperty, ParamPosition, Property, PropertyScope, PropertyType};
use rusqlite::{params, Connection, Row};

const PROPERTY_SELECT_SQL: &str = "SELECT
    id,
    entity_id,
    scope,
    type,
    pos,
    name,
    rule,
    value,
    description,
    parent_id,
    priority,
    required,
    created_at,
    updated_at
FROM properties";

/// Repository interface for property records.
pub trait PropertyRepository {
    fn create_property(&self, property: &NewProperty) -> RepoResult<Property>;
    /// Lists every property of one entity across both scopes.
    fn list_properties(&self, entity_id: EntityId) -> RepoResult<Vec<Property>>;
    /// Physically deletes all properties of one entity. Returns rows deleted.
    fn delete_properties_of_entity(&self, entity_id: EntityId) -> RepoResult<usize>;
}

/// SQLite-backed property repository.
pub struct SqlitePropertyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePropertyRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PropertyRepository for SqlitePropertyRepository<'_> {
    fn create_property(&self, property: &NewProperty) -> RepoResult<Property> {
        self.conn.execute(
            "INSERT INTO properties (
                entity_id,
                scope,
                type,
                pos,
                name,
                rule,
                value,
                description,
                parent_id,
                priority,
                required
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                property.entity_id,
                property.scope.as_str(),
                property.kind.as_str(),
                property.pos.map(|pos| i64::from(pos.code())),
                property.name.as_str(),
                property.rule.as_deref(),
                property.value.as_deref(),
                property.description.as_deref(),
                property.parent_id,
                property.priority,
                i64::from(property.required),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        let mut stmt = self
            .conn
            .prepare(&format!("{PROPERTY_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => parse_property_row(row),
            None => Err(RepoError::NotFound {
                record: "property",
                id,
            }),
        }
    }

    fn list_properties(&self, entity_id: EntityId) -> RepoResult<Vec<Property>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROPERTY_SELECT_SQL}
             WHERE entity_id = ?1
             ORDER BY priority ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([entity_id])?;
        let mut properties = Vec::new();
        while let Some(row) = rows.next()? {
            properties.push(parse_property_row(row)?);
        }
        Ok(properties)
    }

    fn delete_properties_of_entity(&self, entity_id: EntityId) -> RepoResult<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM properties WHERE entity_id = ?1;", [entity_id])?;
        Ok(deleted)
    }
}

fn parse_property_row(row: &Row<'_>) -> RepoResult<Property> {
    let scope_text: String = row.get("scope")?;
    let scope = PropertyScope::parse(&scope_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid property scope `{scope_text}` in properties.scope"
        ))
    })?;

    let type_text: String = row.get("type")?;
    let kind = PropertyType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid property type `{type_text}` in properties.type"
        ))
    })?;

    let pos = match row.get::<_, Option<i64>>("pos")? {
        Some(code) => Some(ParamPosition::from_code(code).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid position `{code}` in properties.pos"))
        })?),
        None => None,
    };

    Ok(Property {
        id: row.get("id")?,
        entity_id: row.get("entity_id")?,
        scope,
        kind,
        pos,
        name: row.get("name")?,
        rule: row.get("rule")?,
        value: row.get("value")?,
        description: row.get("description")?,
        parent_id: row.get("parent_id")?,
        priority: row.get("priority")?,
        required: int_to_bool(row.get("required")?, "properties.required")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
