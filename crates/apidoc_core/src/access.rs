//! Access control contract and repository-membership implementation.
//!
//! # Responsibility
//! - Answer "may this user do X to target Y" for the request surface.
//! - Keep permission rules out of services, which only ask yes/no questions.
//!
//! # Invariants
//! - Anonymous callers may only read public repositories.
//! - Write access to an entity follows write access to its repository,
//!   whether or not the entity is tombstoned.
//! - Unknown targets are denied, never reported as errors.

use crate::model::catalog::Visibility;
use crate::model::entity::{EntityId, ModuleId, RepositoryId};
use crate::model::user::UserId;
use crate::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
use crate::repo::entity_repo::{EntityRepository, RepoResult, SqliteEntityRepository};
use rusqlite::Connection;

/// Permission being checked. The target id's meaning depends on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Read a repository; target is a repository id.
    RepositoryGet,
    /// Write into a repository; target is a repository id.
    RepositorySet,
    /// Edit an entity; target is an entity id.
    EntitySet,
}

impl AccessType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepositoryGet => "repository_get",
            Self::RepositorySet => "repository_set",
            Self::EntitySet => "entity_set",
        }
    }
}

/// Permission oracle consulted before reads and writes.
pub trait AccessControl {
    fn can_user_access(
        &self,
        access: AccessType,
        user_id: Option<UserId>,
        target_id: i64,
    ) -> RepoResult<bool>;

    /// Checks that `user_id` may move or copy `entity_id` into `module_id` of
    /// `repository_id`.
    fn can_user_move_entity(
        &self,
        user_id: UserId,
        entity_id: EntityId,
        repository_id: RepositoryId,
        module_id: ModuleId,
    ) -> RepoResult<bool>;
}

/// Access control backed by repository ownership and membership rows.
pub struct SqliteAccessControl<'conn> {
    catalog: SqliteCatalogRepository<'conn>,
    entities: SqliteEntityRepository<'conn>,
}

impl<'conn> SqliteAccessControl<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            catalog: SqliteCatalogRepository::new(conn),
            entities: SqliteEntityRepository::new(conn),
        }
    }

    fn can_read_repository(
        &self,
        user_id: Option<UserId>,
        repository_id: RepositoryId,
    ) -> RepoResult<bool> {
        let Some(repository) = self.catalog.get_repository(repository_id)? else {
            return Ok(false);
        };
        if repository.visibility == Visibility::Public {
            return Ok(true);
        }
        self.can_write_repository(user_id, repository_id)
    }

    fn can_write_repository(
        &self,
        user_id: Option<UserId>,
        repository_id: RepositoryId,
    ) -> RepoResult<bool> {
        match user_id {
            Some(user_id) => self.catalog.is_owner_or_member(repository_id, user_id),
            None => Ok(false),
        }
    }
}

impl AccessControl for SqliteAccessControl<'_> {
    fn can_user_access(
        &self,
        access: AccessType,
        user_id: Option<UserId>,
        target_id: i64,
    ) -> RepoResult<bool> {
        match access {
            AccessType::RepositoryGet => self.can_read_repository(user_id, target_id),
            AccessType::RepositorySet => self.can_write_repository(user_id, target_id),
            AccessType::EntitySet => match self.entities.get_entity(target_id, true)? {
                Some(entity) => self.can_write_repository(user_id, entity.repository_id),
                None => Ok(false),
            },
        }
    }

    fn can_user_move_entity(
        &self,
        user_id: UserId,
        entity_id: EntityId,
        repository_id: RepositoryId,
        module_id: ModuleId,
    ) -> RepoResult<bool> {
        if !self.can_user_access(AccessType::EntitySet, Some(user_id), entity_id)? {
            return Ok(false);
        }
        if !self.can_write_repository(Some(user_id), repository_id)? {
            return Ok(false);
        }
        let module_in_repository = self
            .catalog
            .get_module(module_id)?
            .is_some_and(|module| module.repository_id == repository_id);
        Ok(module_in_repository)
    }
}
