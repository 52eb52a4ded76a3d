//! Repository/module catalog contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist documentation repositories, their members and modules.
//! - Answer the ownership/membership questions asked by access control.

use super::entity_repo::{RepoError, RepoResult};
use crate::model::catalog::{Module, Repository, Visibility};
use crate::model::entity::{ModuleId, RepositoryId};
use crate::model::user::UserId;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Repository interface for the repository/module catalog.
pub trait CatalogRepository {
    fn create_repository(
        &self,
        name: &str,
        owner_id: UserId,
        visibility: Visibility,
    ) -> RepoResult<Repository>;
    fn get_repository(&self, id: RepositoryId) -> RepoResult<Option<Repository>>;
    /// Adds a member. Adding an existing member is a no-op.
    fn add_member(&self, repository_id: RepositoryId, user_id: UserId) -> RepoResult<()>;
    /// Returns whether `user_id` owns or is a member of the repository.
    fn is_owner_or_member(&self, repository_id: RepositoryId, user_id: UserId)
        -> RepoResult<bool>;
    fn create_module(&self, repository_id: RepositoryId, name: &str) -> RepoResult<Module>;
    fn get_module(&self, id: ModuleId) -> RepoResult<Option<Module>>;
}

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn create_repository(
        &self,
        name: &str,
        owner_id: UserId,
        visibility: Visibility,
    ) -> RepoResult<Repository> {
        self.conn.execute(
            "INSERT INTO repositories (name, owner_id, visibility) VALUES (?1, ?2, ?3);",
            params![name, owner_id, visibility.as_str()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_repository(id)?.ok_or(RepoError::NotFound {
            record: "repository",
            id,
        })
    }

    fn get_repository(&self, id: RepositoryId) -> RepoResult<Option<Repository>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, owner_id, visibility, created_at
             FROM repositories
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => parse_repository_row(row).map(Some),
            None => Ok(None),
        }
    }

    fn add_member(&self, repository_id: RepositoryId, user_id: UserId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO repository_members (repository_id, user_id)
             VALUES (?1, ?2);",
            params![repository_id, user_id],
        )?;
        Ok(())
    }

    fn is_owner_or_member(
        &self,
        repository_id: RepositoryId,
        user_id: UserId,
    ) -> RepoResult<bool> {
        let allowed: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM repositories WHERE id = ?1 AND owner_id = ?2
                UNION ALL
                SELECT 1 FROM repository_members WHERE repository_id = ?1 AND user_id = ?2
            );",
            params![repository_id, user_id],
            |row| row.get(0),
        )?;
        Ok(allowed == 1)
    }

    fn create_module(&self, repository_id: RepositoryId, name: &str) -> RepoResult<Module> {
        self.conn.execute(
            "INSERT INTO modules (repository_id, name, priority)
             VALUES (
                ?1,
                ?2,
                (SELECT COALESCE(MAX(priority), -1) + 1 FROM modules WHERE repository_id = ?1)
             );",
            params![repository_id, name],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_module(id)?.ok_or(RepoError::NotFound {
            record: "module",
            id,
        })
    }

    fn get_module(&self, id: ModuleId) -> RepoResult<Option<Module>> {
        let module = self
            .conn
            .query_row(
                "SELECT id, repository_id, name, priority FROM modules WHERE id = ?1;",
                [id],
                |row| {
                    Ok(Module {
                        id: row.get(0)?,
                        repository_id: row.get(1)?,
                        name: row.get(2)?,
                        priority: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(module)
    }
}

fn parse_repository_row(row: &Row<'_>) -> RepoResult<Repository> {
    let visibility_text: String = row.get("visibility")?;
    let visibility = Visibility::parse(&visibility_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid visibility `{visibility_text}` in repositories.visibility"
        ))
    })?;

    Ok(Repository {
        id: row.get("id")?,
        name: row.get("name")?,
        owner_id: row.get("owner_id")?,
        visibility,
        created_at: row.get("created_at")?,
    })
}
