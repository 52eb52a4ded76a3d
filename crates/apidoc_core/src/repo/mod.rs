//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define one data access contract per record type.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate user-supplied fields before SQL mutations.
//! - Repositories never open transactions; the caller owns the boundary.
//! - Mutations report affected row counts instead of failing on zero rows.

pub mod audit_repo;
pub mod catalog_repo;
pub mod entity_repo;
pub mod property_repo;
pub mod user_repo;

use crate::db::migrations::{current_user_version, latest_version};
use entity_repo::{RepoError, RepoResult};
use rusqlite::Connection;

const REQUIRED_TABLES: &[&str] = &[
    "users",
    "repositories",
    "repository_members",
    "modules",
    "entities",
    "properties",
    "audit_logs",
];

/// Verifies that `conn` carries the schema this binary was built against.
pub fn ensure_schema_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
