//! Audit log repository contract and SQLite implementation.
//!
//! # Invariants
//! - Entries are append-only.
//! - Each entry receives a fresh v4 uuid at write time.

use super::entity_repo::{RepoError, RepoResult};
use crate::model::audit::{AuditEvent, AuditKind, AuditLogEntry};
use crate::model::entity::EntityId;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const AUDIT_SELECT_SQL: &str = "SELECT
    uuid,
    user_id,
    type,
    repository_id,
    module_id,
    entity_id,
    created_at
FROM audit_logs";

/// Repository interface for the audit trail.
pub trait AuditLogRepository {
    fn create_log(&self, event: &AuditEvent) -> RepoResult<AuditLogEntry>;
    /// Lists entries for one entity, newest first.
    fn list_logs_for_entity(&self, entity_id: EntityId) -> RepoResult<Vec<AuditLogEntry>>;
}

/// SQLite-backed audit log repository.
pub struct SqliteAuditLogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditLogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AuditLogRepository for SqliteAuditLogRepository<'_> {
    fn create_log(&self, event: &AuditEvent) -> RepoResult<AuditLogEntry> {
        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO audit_logs (
                uuid,
                user_id,
                type,
                repository_id,
                module_id,
                entity_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                uuid.to_string(),
                event.user_id,
                event.kind.as_str(),
                event.repository_id,
                event.module_id,
                event.entity_id,
            ],
        )?;

        let mut stmt = self
            .conn
            .prepare(&format!("{AUDIT_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([uuid.to_string()])?;
        match rows.next()? {
            Some(row) => parse_audit_row(row),
            None => Err(RepoError::InvalidData(format!(
                "audit log `{uuid}` missing after insert"
            ))),
        }
    }

    fn list_logs_for_entity(&self, entity_id: EntityId) -> RepoResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{AUDIT_SELECT_SQL}
             WHERE entity_id = ?1
             ORDER BY created_at DESC, id DESC;"
        ))?;
        let mut rows = stmt.query([entity_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_audit_row(row)?);
        }
        Ok(entries)
    }
}

fn parse_audit_row(row: &Row<'_>) -> RepoResult<AuditLogEntry> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid `{uuid_text}` in audit_logs.uuid"))
    })?;

    let type_text: String = row.get("type")?;
    let kind = AuditKind::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid audit type `{type_text}` in audit_logs.type"))
    })?;

    Ok(AuditLogEntry {
        uuid,
        user_id: row.get("user_id")?,
        kind,
        repository_id: row.get("repository_id")?,
        module_id: row.get("module_id")?,
        entity_id: row.get("entity_id")?,
        created_at: row.get("created_at")?,
    })
}
