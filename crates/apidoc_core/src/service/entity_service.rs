//! Entity use-case service.
//!
//! # Responsibility
//! - Provide count/list/get/create/update/move/remove for entities.
//! - Compose each mutation with its audit record: mutate, inspect the row
//!   count, then log.
//! - Assemble the detail view with property trees per scope.
//!
//! # Invariants
//! - Mutations that change zero rows write no audit record.
//! - Removing an entity always deletes its properties, and only its own.
//! - Copies never inherit the source's lock.

use crate::access::{AccessControl, AccessType};
use crate::model::audit::{AuditEvent, AuditKind, AuditLogEntry};
use crate::model::entity::{Entity, EntityId, EntityPatch, ModuleId, NewEntity, RepositoryId};
use crate::model::property::{NewProperty, Property, PropertyId, PropertyScope};
use crate::model::user::UserId;
use crate::repo::audit_repo::AuditLogRepository;
use crate::repo::entity_repo::{EntityListQuery, EntityRepository};
use crate::repo::property_repo::PropertyRepository;
use crate::service::{now_epoch_ms, ServiceError, Session};
use crate::tree::literal::{ExtendedValue, ToExtended};
use crate::tree::{array_to_tree, Tree};
use log::{debug, info};
use std::collections::HashMap;

/// How `move_entity` treats the source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOp {
    /// Relocate the entity itself.
    Move,
    /// Leave the source and create a duplicate at the destination.
    Copy,
}

impl MoveOp {
    pub fn code(self) -> i64 {
        match self {
            Self::Move => 1,
            Self::Copy => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Move),
            2 => Some(Self::Copy),
            _ => None,
        }
    }
}

/// Request model for moving or copying an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub entity_id: EntityId,
    pub module_id: ModuleId,
    pub op: MoveOp,
    /// Destination repository; defaults to the entity's current one.
    pub repository_id: Option<RepositoryId>,
}

/// Result of an update: rows changed plus the entity as now stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub rows: usize,
    /// `None` when the entity is missing or deleted.
    pub entity: Option<Entity>,
}

/// Entity with its properties, flat and nested per scope.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDetail {
    pub entity: Entity,
    pub properties: Vec<Property>,
    pub request_properties: Tree<Property>,
    pub response_properties: Tree<Property>,
}

impl ToExtended for EntityDetail {
    fn to_extended(&self) -> ExtendedValue {
        let mut value = self.entity.to_extended();
        value.insert("properties", self.properties.to_extended());
        value.insert(
            "requestProperties",
            self.request_properties.children.to_extended(),
        );
        value.insert(
            "responseProperties",
            self.response_properties.children.to_extended(),
        );
        value
    }
}

/// Use-case service for entity CRUD.
pub struct EntityService<E, P, A, L>
where
    E: EntityRepository,
    P: PropertyRepository,
    A: AccessControl,
    L: AuditLogRepository,
{
    entities: E,
    properties: P,
    access: A,
    audit: L,
}

impl<E, P, A, L> EntityService<E, P, A, L>
where
    E: EntityRepository,
    P: PropertyRepository,
    A: AccessControl,
    L: AuditLogRepository,
{
    pub fn new(entities: E, properties: P, access: A, audit: L) -> Self {
        Self {
            entities,
            properties,
            access,
            audit,
        }
    }

    /// Counts active entities.
    pub fn count(&self) -> Result<u64, ServiceError> {
        Ok(self.entities.count_entities()?)
    }

    /// Lists active entities, optionally limited to one repository.
    pub fn list(&self, repository_id: Option<RepositoryId>) -> Result<Vec<Entity>, ServiceError> {
        let query = EntityListQuery {
            repository_id,
            include_deleted: false,
        };
        Ok(self.entities.list_entities(&query)?)
    }

    /// Loads one entity with its property trees.
    ///
    /// Readable by anyone allowed to read the owning repository.
    pub fn get(&self, id: EntityId, session: &Session) -> Result<EntityDetail, ServiceError> {
        let entity = self
            .entities
            .get_entity(id, false)?
            .ok_or(ServiceError::EntityNotFound(id))?;
        self.ensure_access(AccessType::RepositoryGet, session.user_id, entity.repository_id)?;

        let properties = self.properties.list_properties(entity.id)?;
        let scope_tree = |scope: PropertyScope| {
            array_to_tree(
                properties
                    .iter()
                    .filter(|property| property.scope == scope)
                    .cloned()
                    .collect(),
            )
        };
        let request_properties = scope_tree(PropertyScope::Request);
        let response_properties = scope_tree(PropertyScope::Response);

        Ok(EntityDetail {
            entity,
            properties,
            request_properties,
            response_properties,
        })
    }

    /// Creates an entity owned by the session user and records `create`.
    pub fn create(&self, entity: NewEntity, session: &Session) -> Result<Entity, ServiceError> {
        let user_id = session.require_user()?;
        self.ensure_access(AccessType::RepositorySet, Some(user_id), entity.repository_id)?;

        let entity = NewEntity {
            creator_id: Some(user_id),
            priority: now_epoch_ms(),
            ..entity
        };
        let created = self.entities.create_entity(&entity)?;
        self.record(AuditKind::Create, Some(user_id), &created)?;

        info!(
            "event=entity_create module=entity status=ok entity_id={} repository_id={} user_id={user_id}",
            created.id, created.repository_id
        );
        Ok(created)
    }

    /// Applies a partial update and records `update` when a row changed.
    pub fn update(
        &self,
        patch: &EntityPatch,
        session: &Session,
    ) -> Result<UpdateOutcome, ServiceError> {
        let user_id = session.require_user()?;
        self.ensure_access(AccessType::EntitySet, Some(user_id), patch.id)?;
        if let Some(repository_id) = patch.repository_id {
            self.ensure_access(AccessType::RepositorySet, Some(user_id), repository_id)?;
        }

        let rows = self.entities.update_entity(patch)?;
        let entity = self.entities.get_entity(patch.id, false)?;
        match (&entity, rows) {
            (Some(entity), rows) if rows > 0 => {
                self.record(AuditKind::Update, Some(user_id), entity)?;
                info!(
                    "event=entity_update module=entity status=ok entity_id={} rows={rows}",
                    patch.id
                );
            }
            _ => debug!(
                "event=entity_update module=entity status=noop entity_id={} rows={rows}",
                patch.id
            ),
        }

        Ok(UpdateOutcome { rows, entity })
    }

    /// Moves or copies an entity into `request.module_id`.
    ///
    /// Returns the relocated entity or the new copy.
    pub fn move_entity(
        &self,
        request: &MoveRequest,
        session: &Session,
    ) -> Result<Entity, ServiceError> {
        let user_id = session.require_user()?;
        let entity = self
            .entities
            .get_entity(request.entity_id, false)?
            .ok_or(ServiceError::EntityNotFound(request.entity_id))?;
        let repository_id = request.repository_id.unwrap_or(entity.repository_id);

        if !self.access.can_user_move_entity(
            user_id,
            entity.id,
            repository_id,
            request.module_id,
        )? {
            return Err(ServiceError::AccessDenied);
        }

        let result = match request.op {
            MoveOp::Move => {
                self.entities
                    .relocate_entity(entity.id, repository_id, request.module_id)?;
                self.entities
                    .get_entity(entity.id, false)?
                    .ok_or(ServiceError::EntityNotFound(entity.id))?
            }
            MoveOp::Copy => self.copy_entity(&entity, user_id, repository_id, request.module_id)?,
        };

        info!(
            "event=entity_move module=entity status=ok op={} source_id={} result_id={} repository_id={repository_id} module_id={}",
            request.op.code(),
            entity.id,
            result.id,
            request.module_id
        );
        Ok(result)
    }

    /// Soft-deletes an entity, deletes its properties and records `delete`
    /// when the entity row changed. Returns the entity rows affected.
    pub fn remove(&self, id: EntityId, session: &Session) -> Result<usize, ServiceError> {
        self.ensure_access(AccessType::EntitySet, session.user_id, id)?;

        let rows = self.entities.soft_delete_entity(id)?;
        let removed_properties = self.properties.delete_properties_of_entity(id)?;
        if rows == 0 {
            debug!("event=entity_remove module=entity status=noop entity_id={id}");
            return Ok(0);
        }

        let entity = self
            .entities
            .get_entity(id, true)?
            .ok_or(ServiceError::EntityNotFound(id))?;
        self.record(AuditKind::Delete, session.user_id, &entity)?;

        info!(
            "event=entity_remove module=entity status=ok entity_id={id} properties={removed_properties}"
        );
        Ok(rows)
    }

    /// Lists audit entries for an entity, newest first.
    pub fn audit_trail(&self, id: EntityId) -> Result<Vec<AuditLogEntry>, ServiceError> {
        Ok(self.audit.list_logs_for_entity(id)?)
    }

    fn copy_entity(
        &self,
        source: &Entity,
        user_id: UserId,
        repository_id: RepositoryId,
        module_id: ModuleId,
    ) -> Result<Entity, ServiceError> {
        let copy = self.entities.create_entity(&NewEntity {
            kind: source.kind,
            name: source.name.clone(),
            namespace: source.namespace.clone(),
            description: source.description.clone(),
            repository_id,
            module_id,
            creator_id: Some(user_id),
            priority: now_epoch_ms(),
        })?;

        // Pre-order guarantees parents are copied before their children.
        let ordered = array_to_tree(self.properties.list_properties(source.id)?).into_preorder();
        let mut id_map: HashMap<PropertyId, PropertyId> = HashMap::with_capacity(ordered.len());
        for property in &ordered {
            let parent_id = property
                .parent_id
                .and_then(|parent_id| id_map.get(&parent_id).copied());
            let created = self
                .properties
                .create_property(&NewProperty::copy_of(property, copy.id, parent_id))?;
            id_map.insert(property.id, created.id);
        }

        self.record(AuditKind::Create, Some(user_id), &copy)?;
        Ok(copy)
    }

    fn ensure_access(
        &self,
        access: AccessType,
        user_id: Option<UserId>,
        target_id: i64,
    ) -> Result<(), ServiceError> {
        if self.access.can_user_access(access, user_id, target_id)? {
            return Ok(());
        }
        debug!(
            "event=access_check module=entity status=denied access={} target_id={target_id}",
            access.as_str()
        );
        Err(ServiceError::AccessDenied)
    }

    fn record(
        &self,
        kind: AuditKind,
        user_id: Option<UserId>,
        entity: &Entity,
    ) -> Result<AuditLogEntry, ServiceError> {
        let entry = self.audit.create_log(&AuditEvent {
            user_id,
            kind,
            repository_id: Some(entity.repository_id),
            module_id: Some(entity.module_id),
            entity_id: Some(entity.id),
        })?;
        Ok(entry)
    }
}
