//! `/entity/*` request handlers.
//!
//! # Responsibility
//! - Parse request parameters, call the entity and lock services, and shape
//!   their results into response bodies.
//! - Own the transaction boundary: every mutating route runs in one
//!   `IMMEDIATE` transaction that rolls back on any failure.
//!
//! # Invariants
//! - Authentication is checked before the request body is interpreted.
//! - The detail view is serialized with extended literals; every other body
//!   is plain JSON.

use crate::access::SqliteAccessControl;
use crate::api::{
    error_response, failure_body, id_field, optional_id_param, required_id_field,
    required_id_param, ApiRequest, ApiResponse, Method,
};
use crate::model::entity::{EntityPatch, NewEntity};
use crate::repo::audit_repo::SqliteAuditLogRepository;
use crate::repo::ensure_schema_ready;
use crate::repo::entity_repo::{RepoError, RepoResult, SqliteEntityRepository};
use crate::repo::property_repo::SqlitePropertyRepository;
use crate::repo::user_repo::SqliteUserRepository;
use crate::service::entity_service::{EntityService, MoveOp, MoveRequest};
use crate::service::lock_service::LockService;
use crate::service::ServiceError;
use crate::tree::literal::{stringify_with_extended_literals, ExtendedValue, ToExtended};
use log::{error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::{json, Value};
use std::time::Instant;

type SqliteEntityService<'conn> = EntityService<
    SqliteEntityRepository<'conn>,
    SqlitePropertyRepository<'conn>,
    SqliteAccessControl<'conn>,
    SqliteAuditLogRepository<'conn>,
>;

type SqliteLockService<'conn> = LockService<
    SqliteEntityRepository<'conn>,
    SqliteUserRepository<'conn>,
    SqliteAccessControl<'conn>,
>;

type RouteResult = Result<ApiResponse, ServiceError>;

fn entity_service(conn: &Connection) -> SqliteEntityService<'_> {
    EntityService::new(
        SqliteEntityRepository::new(conn),
        SqlitePropertyRepository::new(conn),
        SqliteAccessControl::new(conn),
        SqliteAuditLogRepository::new(conn),
    )
}

fn lock_service(conn: &Connection) -> SqliteLockService<'_> {
    LockService::new(
        SqliteEntityRepository::new(conn),
        SqliteUserRepository::new(conn),
        SqliteAccessControl::new(conn),
    )
}

/// Entity routes bound to one migrated connection.
pub struct EntityApi<'conn> {
    conn: &'conn Connection,
}

impl<'conn> EntityApi<'conn> {
    /// Binds the routes to `conn` after checking its schema.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version does not match.
    /// - `MissingRequiredTable` when a core table is absent.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }

    /// Dispatches one request and always produces a JSON response.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let started_at = Instant::now();
        let result = match (request.method, request.path.as_str()) {
            (Method::Get, "/entity/count") => self.count(),
            (Method::Get, "/entity/list") => self.list(request),
            (Method::Get, "/entity/get") => self.get(request),
            (Method::Post, "/entity/create") => self.create(request),
            (Method::Post, "/entity/update") => self.update(request),
            (Method::Post, "/entity/move") => self.move_entity(request),
            (Method::Get, "/entity/remove") => self.remove(request),
            (Method::Post, "/entity/lock") => self.lock(request),
            (Method::Post, "/entity/unlock") => self.unlock(request),
            (method, path) => {
                warn!(
                    "event=api_request module=api status=unknown_route method={}",
                    method.as_str()
                );
                return ApiResponse::json(&failure_body(format!(
                    "no route for {} {path}",
                    method.as_str()
                )));
            }
        };
        let duration_ms = started_at.elapsed().as_millis();

        match result {
            Ok(response) => {
                info!(
                    "event=api_request module=api status=ok method={} path={} duration_ms={duration_ms}",
                    request.method.as_str(),
                    request.path
                );
                response
            }
            Err(err) => {
                let status = match &err {
                    ServiceError::Repo(_) | ServiceError::Serialization(_) => {
                        error!(
                            "event=api_request module=api status=error method={} path={} duration_ms={duration_ms} error={err}",
                            request.method.as_str(),
                            request.path
                        );
                        "error"
                    }
                    ServiceError::NotAuthenticated | ServiceError::AccessDenied => "denied",
                    _ => "rejected",
                };
                if status != "error" {
                    info!(
                        "event=api_request module=api status={status} method={} path={} duration_ms={duration_ms}",
                        request.method.as_str(),
                        request.path
                    );
                }
                error_response(&err)
            }
        }
    }

    fn count(&self) -> RouteResult {
        let count = entity_service(self.conn).count()?;
        Ok(data_response(json!(count)))
    }

    fn list(&self, request: &ApiRequest) -> RouteResult {
        let repository_id =
            optional_id_param(request.query_param("repositoryId"), "repositoryId")?;
        let entities = entity_service(self.conn).list(repository_id)?;
        Ok(data_response(serde_json::to_value(entities)?))
    }

    fn get(&self, request: &ApiRequest) -> RouteResult {
        let id = required_id_param(request.query_param("id"), "id")?;
        let detail = entity_service(self.conn).get(id, &request.session)?;

        let body = ExtendedValue::object([("data", detail.to_extended())]);
        Ok(ApiResponse::text(stringify_with_extended_literals(&body)?))
    }

    fn create(&self, request: &ApiRequest) -> RouteResult {
        request.session.require_user()?;
        let entity: NewEntity = parse_body(&request.body)?;

        let created =
            self.in_transaction(|conn| entity_service(conn).create(entity, &request.session))?;
        Ok(data_response(json!({ "ent": created })))
    }

    fn update(&self, request: &ApiRequest) -> RouteResult {
        request.session.require_user()?;
        let id = required_id_field(&request.body, "id")?;
        let mut body = request.body.clone();
        if let Some(fields) = body.as_object_mut() {
            fields.insert("id".to_string(), json!(id));
        }
        let patch: EntityPatch = parse_body(&body)?;

        let outcome =
            self.in_transaction(|conn| entity_service(conn).update(&patch, &request.session))?;
        Ok(data_response(json!({ "ent": outcome.entity })))
    }

    fn move_entity(&self, request: &ApiRequest) -> RouteResult {
        request.session.require_user()?;
        let entity_id = required_id_field(&request.body, "entId")?;
        let module_id = required_id_field(&request.body, "modId")?;
        let op_code = required_id_field(&request.body, "op")?;
        let op = MoveOp::from_code(op_code).ok_or(ServiceError::InvalidMoveOp(op_code))?;
        let repository_id = id_field(&request.body, "repositoryId")?;

        let move_request = MoveRequest {
            entity_id,
            module_id,
            op,
            repository_id,
        };
        self.in_transaction(|conn| {
            entity_service(conn).move_entity(&move_request, &request.session)
        })?;
        Ok(data_response(json!({ "isOk": true })))
    }

    fn remove(&self, request: &ApiRequest) -> RouteResult {
        let id = required_id_param(request.query_param("id"), "id")?;
        let rows = self.in_transaction(|conn| entity_service(conn).remove(id, &request.session))?;
        Ok(data_response(json!(rows)))
    }

    fn lock(&self, request: &ApiRequest) -> RouteResult {
        request.session.require_user()?;
        let id = required_id_field(&request.body, "id")?;
        let owner = self.in_transaction(|conn| lock_service(conn).lock(id, &request.session))?;
        Ok(data_response(serde_json::to_value(owner)?))
    }

    fn unlock(&self, request: &ApiRequest) -> RouteResult {
        request.session.require_user()?;
        let id = required_id_field(&request.body, "id")?;
        self.in_transaction(|conn| lock_service(conn).unlock(id, &request.session))?;
        Ok(data_response(json!({ "isOk": true })))
    }

    /// Runs `work` in one `IMMEDIATE` transaction; any error rolls it back.
    fn in_transaction<T>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let value = work(&tx)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}

fn data_response(data: Value) -> ApiResponse {
    ApiResponse::json(&json!({ "data": data }))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Value) -> Result<T, ServiceError> {
    serde_json::from_value(body.clone()).map_err(|err| ServiceError::InvalidParameter {
        name: "body",
        value: err.to_string(),
    })
}
