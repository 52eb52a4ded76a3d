//! Entity repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide count/list/get/create/update/soft-delete over `entities`.
//! - Provide the compare-and-set writes behind the advisory edit lock.
//!
//! # Invariants
//! - Soft-deleted rows are only visible when explicitly requested.
//! - Lock writes never overwrite an existing owner.

use crate::db::DbError;
use crate::model::entity::{
    Entity, EntityId, EntityKind, EntityPatch, EntityValidationError, ModuleId, NewEntity,
    RepositoryId,
};
use crate::model::user::UserId;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const ENTITY_SELECT_SQL: &str = "SELECT
    id,
    type,
    name,
    namespace,
    description,
    creator_id,
    locker_id,
    repository_id,
    module_id,
    priority,
    created_at,
    updated_at,
    deleted_at
FROM entities";

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error shared by every repository.
#[derive(Debug)]
pub enum RepoError {
    Validation(EntityValidationError),
    Db(DbError),
    /// A referenced row that must exist does not.
    NotFound { record: &'static str, id: i64 },
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { record, id } => write!(f, "{record} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EntityValidationError> for RepoError {
    fn from(value: EntityValidationError) -> Self {
        Self::Validation(value)
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

/// Query options for listing entities.
#[derive(Debug, Clone, Default)]
pub struct EntityListQuery {
    pub repository_id: Option<RepositoryId>,
    pub include_deleted: bool,
}

/// Repository interface for entity records.
pub trait EntityRepository {
    /// Counts active entities.
    fn count_entities(&self) -> RepoResult<u64>;
    fn list_entities(&self, query: &EntityListQuery) -> RepoResult<Vec<Entity>>;
    fn get_entity(&self, id: EntityId, include_deleted: bool) -> RepoResult<Option<Entity>>;
    fn create_entity(&self, entity: &NewEntity) -> RepoResult<Entity>;
    /// Applies the present patch fields to an active entity. Returns rows changed.
    fn update_entity(&self, patch: &EntityPatch) -> RepoResult<usize>;
    /// Tombstones an active entity. Returns rows changed.
    fn soft_delete_entity(&self, id: EntityId) -> RepoResult<usize>;
    /// Sets the lock owner only if the entity is currently unlocked.
    /// Returns whether this call acquired the lock.
    fn acquire_lock(&self, id: EntityId, user_id: UserId) -> RepoResult<bool>;
    /// Clears the lock owner only if it equals `user_id`.
    fn release_lock(&self, id: EntityId, user_id: UserId) -> RepoResult<bool>;
    /// Moves an active entity to another repository/module. Returns rows changed.
    fn relocate_entity(
        &self,
        id: EntityId,
        repository_id: RepositoryId,
        module_id: ModuleId,
    ) -> RepoResult<usize>;
}

/// SQLite-backed entity repository.
pub struct SqliteEntityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntityRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EntityRepository for SqliteEntityRepository<'_> {
    fn count_entities(&self) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE deleted_at IS NULL;",
            [],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative entity count `{count}`")))
    }

    fn list_entities(&self, query: &EntityListQuery) -> RepoResult<Vec<Entity>> {
        let mut sql = format!("{ENTITY_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }

        if let Some(repository_id) = query.repository_id {
            sql.push_str(" AND repository_id = ?");
            bind_values.push(Value::Integer(repository_id));
        }

        sql.push_str(" ORDER BY priority ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(parse_entity_row(row)?);
        }
        Ok(entities)
    }

    fn get_entity(&self, id: EntityId, include_deleted: bool) -> RepoResult<Option<Entity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENTITY_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR deleted_at IS NULL);"
        ))?;

        let mut rows = stmt.query(params![id, i64::from(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_entity_row(row)?));
        }
        Ok(None)
    }

    fn create_entity(&self, entity: &NewEntity) -> RepoResult<Entity> {
        entity.validate()?;

        self.conn.execute(
            "INSERT INTO entities (
                type,
                name,
                namespace,
                description,
                creator_id,
                locker_id,
                repository_id,
                module_id,
                priority
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8);",
            params![
                entity.kind.as_str(),
                entity.name.as_str(),
                entity.namespace.as_str(),
                entity.description.as_deref(),
                entity.creator_id,
                entity.repository_id,
                entity.module_id,
                entity.priority,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_entity(id, false)?
            .ok_or(RepoError::NotFound {
                record: "entity",
                id,
            })
    }

    fn update_entity(&self, patch: &EntityPatch) -> RepoResult<usize> {
        patch.validate()?;

        let mut assignments: Vec<&str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(kind) = patch.kind {
            assignments.push("type = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(name) = &patch.name {
            assignments.push("name = ?");
            bind_values.push(Value::Text(name.clone()));
        }
        if let Some(namespace) = &patch.namespace {
            assignments.push("namespace = ?");
            bind_values.push(Value::Text(namespace.clone()));
        }
        if let Some(description) = &patch.description {
            assignments.push("description = ?");
            bind_values.push(description.clone().map_or(Value::Null, Value::Text));
        }
        if let Some(repository_id) = patch.repository_id {
            assignments.push("repository_id = ?");
            bind_values.push(Value::Integer(repository_id));
        }
        if let Some(module_id) = patch.module_id {
            assignments.push("module_id = ?");
            bind_values.push(Value::Integer(module_id));
        }
        assignments.push("updated_at = (strftime('%s', 'now') * 1000)");
        bind_values.push(Value::Integer(patch.id));

        let sql = format!(
            "UPDATE entities SET {} WHERE id = ? AND deleted_at IS NULL;",
            assignments.join(", ")
        );
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed)
    }

    fn soft_delete_entity(&self, id: EntityId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE entities
             SET
                deleted_at = (strftime('%s', 'now') * 1000),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND deleted_at IS NULL;",
            [id],
        )?;
        Ok(changed)
    }

    fn acquire_lock(&self, id: EntityId, user_id: UserId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE entities
             SET locker_id = ?2
             WHERE id = ?1
               AND locker_id IS NULL
               AND deleted_at IS NULL;",
            params![id, user_id],
        )?;
        Ok(changed == 1)
    }

    fn release_lock(&self, id: EntityId, user_id: UserId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE entities
             SET locker_id = NULL
             WHERE id = ?1
               AND locker_id = ?2;",
            params![id, user_id],
        )?;
        Ok(changed == 1)
    }

    fn relocate_entity(
        &self,
        id: EntityId,
        repository_id: RepositoryId,
        module_id: ModuleId,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE entities
             SET
                repository_id = ?2,
                module_id = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![id, repository_id, module_id],
        )?;
        Ok(changed)
    }
}

fn parse_entity_row(row: &Row<'_>) -> RepoResult<Entity> {
    let type_text: String = row.get("type")?;
    let kind = EntityKind::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid entity type `{type_text}` in entities.type"))
    })?;

    Ok(Entity {
        id: row.get("id")?,
        kind,
        name: row.get("name")?,
        namespace: row.get("namespace")?,
        description: row.get("description")?,
        creator_id: row.get("creator_id")?,
        locker_id: row.get("locker_id")?,
        repository_id: row.get("repository_id")?,
        module_id: row.get("module_id")?,
        priority: row.get("priority")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}
