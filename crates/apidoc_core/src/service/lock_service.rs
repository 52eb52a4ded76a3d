//! Advisory edit lock on entities.
//!
//! # Responsibility
//! - Record which user is editing an entity.
//! - Report the current owner to anyone who asks for the lock.
//!
//! # Invariants
//! - Locking is idempotent: once any user holds the lock, further lock calls
//!   return that owner and change nothing.
//! - Only the owner can unlock; anyone else gets `NotLockOwner` and the lock
//!   is left in place.
//! - Acquisition is compare-and-set, so a concurrent first lock cannot
//!   overwrite an owner.

use crate::access::{AccessControl, AccessType};
use crate::model::entity::{Entity, EntityId};
use crate::model::user::{User, UserId};
use crate::repo::entity_repo::{EntityRepository, RepoError};
use crate::repo::user_repo::UserRepository;
use crate::service::{ServiceError, Session};
use log::{debug, info, warn};

/// Lock/unlock use cases.
pub struct LockService<E, U, A>
where
    E: EntityRepository,
    U: UserRepository,
    A: AccessControl,
{
    entities: E,
    users: U,
    access: A,
}

impl<E, U, A> LockService<E, U, A>
where
    E: EntityRepository,
    U: UserRepository,
    A: AccessControl,
{
    pub fn new(entities: E, users: U, access: A) -> Self {
        Self {
            entities,
            users,
            access,
        }
    }

    /// Locks `entity_id` for the session user, or reports the existing owner.
    ///
    /// # Errors
    /// - `NotAuthenticated` without a session user.
    /// - `EntityNotFound` for unknown or deleted entities.
    /// - `AccessDenied` when the user may not edit the entity.
    pub fn lock(&self, entity_id: EntityId, session: &Session) -> Result<User, ServiceError> {
        let user_id = session.require_user()?;
        let entity = self.load_active(entity_id)?;
        self.ensure_can_edit(user_id, entity_id)?;

        if let Some(owner_id) = entity.locker_id {
            debug!(
                "event=entity_lock module=lock status=already_held entity_id={entity_id} owner_id={owner_id} requester_id={user_id}"
            );
            return self.load_owner(owner_id);
        }

        let acquired = self.entities.acquire_lock(entity_id, user_id)?;
        let owner_id = self
            .load_active(entity_id)?
            .locker_id
            .ok_or(ServiceError::EntityNotFound(entity_id))?;
        if acquired {
            info!("event=entity_lock module=lock status=ok entity_id={entity_id} owner_id={owner_id}");
        } else {
            warn!(
                "event=entity_lock module=lock status=lost_race entity_id={entity_id} owner_id={owner_id} requester_id={user_id}"
            );
        }
        self.load_owner(owner_id)
    }

    /// Releases the lock held by the session user.
    ///
    /// # Errors
    /// - `NotAuthenticated`, `EntityNotFound`, `AccessDenied` as for [`Self::lock`].
    /// - `NotLockOwner` when the lock is absent or held by someone else.
    pub fn unlock(&self, entity_id: EntityId, session: &Session) -> Result<(), ServiceError> {
        let user_id = session.require_user()?;
        let entity = self.load_active(entity_id)?;
        self.ensure_can_edit(user_id, entity_id)?;

        if entity.locker_id != Some(user_id) || !self.entities.release_lock(entity_id, user_id)? {
            info!(
                "event=entity_unlock module=lock status=rejected entity_id={entity_id} requester_id={user_id}"
            );
            return Err(ServiceError::NotLockOwner { entity_id });
        }

        info!("event=entity_unlock module=lock status=ok entity_id={entity_id}");
        Ok(())
    }

    fn load_active(&self, entity_id: EntityId) -> Result<Entity, ServiceError> {
        self.entities
            .get_entity(entity_id, false)?
            .ok_or(ServiceError::EntityNotFound(entity_id))
    }

    fn ensure_can_edit(&self, user_id: UserId, entity_id: EntityId) -> Result<(), ServiceError> {
        if self
            .access
            .can_user_access(AccessType::EntitySet, Some(user_id), entity_id)?
        {
            return Ok(());
        }
        Err(ServiceError::AccessDenied)
    }

    fn load_owner(&self, owner_id: UserId) -> Result<User, ServiceError> {
        let owner = self.users.get_user(owner_id)?.ok_or(RepoError::NotFound {
            record: "user",
            id: owner_id,
        })?;
        Ok(owner)
    }
}
