//! Core domain logic for the API documentation service.
//! Entities, their property trees, advisory edit locks and the audit trail
//! are all owned here; the CLI is a thin shell over [`api::EntityApi`].

pub mod access;
pub mod api;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod tree;

pub use access::{AccessControl, AccessType, SqliteAccessControl};
pub use api::entity_routes::EntityApi;
pub use api::{ApiRequest, ApiResponse, Method};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::entity::{Entity, EntityId, EntityKind, EntityPatch, NewEntity};
pub use model::property::{NewProperty, ParamPosition, Property, PropertyScope, PropertyType};
pub use repo::entity_repo::{EntityRepository, RepoError, RepoResult, SqliteEntityRepository};
pub use service::entity_service::{EntityDetail, EntityService, MoveOp, MoveRequest};
pub use service::lock_service::LockService;
pub use service::{ServiceError, Session};
pub use tree::literal::{parse_with_extended_literals, stringify_with_extended_literals};
pub use tree::{array_to_tree, Branch, Tree, TreeNode};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
