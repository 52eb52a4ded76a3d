use apidoc_core::db::open_db_in_memory;
use apidoc_core::model::audit::AuditKind;
use apidoc_core::model::catalog::Visibility;
use apidoc_core::model::user::NewUser;
use apidoc_core::repo::audit_repo::SqliteAuditLogRepository;
use apidoc_core::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
use apidoc_core::repo::entity_repo::EntityListQuery;
use apidoc_core::repo::property_repo::{PropertyRepository, SqlitePropertyRepository};
use apidoc_core::repo::user_repo::{SqliteUserRepository, UserRepository};
use apidoc_core::{
    EntityKind, EntityPatch, EntityRepository, EntityService, NewEntity, NewProperty,
    PropertyScope, PropertyType, RepoError, ServiceError, Session, SqliteAccessControl,
    SqliteEntityRepository,
};
use rusqlite::Connection;

type Service<'conn> = EntityService<
    SqliteEntityRepository<'conn>,
    SqlitePropertyRepository<'conn>,
    SqliteAccessControl<'conn>,
    SqliteAuditLogRepository<'conn>,
>;

struct Fixture {
    owner_id: i64,
    outsider_id: i64,
    repository_id: i64,
    module_id: i64,
}

fn seed(conn: &Connection) -> Fixture {
    let users = SqliteUserRepository::new(conn);
    let catalog = SqliteCatalogRepository::new(conn);
    let owner = users
        .create_user(&NewUser::new("Owner", "owner@example.com"))
        .unwrap();
    let outsider = users
        .create_user(&NewUser::new("Outsider", "outsider@example.com"))
        .unwrap();
    let repository = catalog
        .create_repository("payments", owner.id, Visibility::Private)
        .unwrap();
    let module = catalog.create_module(repository.id, "orders").unwrap();
    Fixture {
        owner_id: owner.id,
        outsider_id: outsider.id,
        repository_id: repository.id,
        module_id: module.id,
    }
}

fn service(conn: &Connection) -> Service<'_> {
    EntityService::new(
        SqliteEntityRepository::new(conn),
        SqlitePropertyRepository::new(conn),
        SqliteAccessControl::new(conn),
        SqliteAuditLogRepository::new(conn),
    )
}

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqliteEntityRepository::new(&conn);

    let mut new_entity =
        NewEntity::new(EntityKind::Struct, "Order", fx.repository_id, fx.module_id);
    new_entity.namespace = "shop.v1".to_string();
    new_entity.description = Some("purchase order".to_string());
    let created = repo.create_entity(&new_entity).unwrap();

    let loaded = repo.get_entity(created.id, false).unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.kind, EntityKind::Struct);
    assert_eq!(loaded.namespace, "shop.v1");
    assert!(loaded.locker_id.is_none());
    assert!(loaded.is_active());
}

#[test]
fn update_keeps_or_clears_description() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqliteEntityRepository::new(&conn);

    let mut new_entity =
        NewEntity::new(EntityKind::Struct, "Order", fx.repository_id, fx.module_id);
    new_entity.description = Some("purchase order".to_string());
    let created = repo.create_entity(&new_entity).unwrap();

    let rename: EntityPatch =
        serde_json::from_value(serde_json::json!({ "id": created.id, "name": "Order2" }))
            .unwrap();
    assert_eq!(repo.update_entity(&rename).unwrap(), 1);
    let loaded = repo.get_entity(created.id, false).unwrap().unwrap();
    assert_eq!(loaded.description.as_deref(), Some("purchase order"));

    let clear: EntityPatch =
        serde_json::from_value(serde_json::json!({ "id": created.id, "description": null }))
            .unwrap();
    assert_eq!(repo.update_entity(&clear).unwrap(), 1);
    let loaded = repo.get_entity(created.id, false).unwrap().unwrap();
    assert_eq!(loaded.description, None);
    assert_eq!(loaded.name, "Order2");
}

#[test]
fn blank_name_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqliteEntityRepository::new(&conn);

    let err = repo
        .create_entity(&NewEntity::new(
            EntityKind::Union,
            "   ",
            fx.repository_id,
            fx.module_id,
        ))
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn count_and_list_skip_deleted_entities() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let other_repository = SqliteCatalogRepository::new(&conn)
        .create_repository("shipping", fx.owner_id, Visibility::Public)
        .unwrap();
    let other_module = SqliteCatalogRepository::new(&conn)
        .create_module(other_repository.id, "parcels")
        .unwrap();
    let repo = SqliteEntityRepository::new(&conn);

    let first = repo
        .create_entity(&NewEntity::new(EntityKind::Struct, "A", fx.repository_id, fx.module_id))
        .unwrap();
    let second = repo
        .create_entity(&NewEntity::new(EntityKind::Exception, "B", fx.repository_id, fx.module_id))
        .unwrap();
    repo.create_entity(&NewEntity::new(
        EntityKind::Struct,
        "C",
        other_repository.id,
        other_module.id,
    ))
    .unwrap();
    assert_eq!(repo.soft_delete_entity(first.id).unwrap(), 1);

    assert_eq!(repo.count_entities().unwrap(), 2);
    let in_payments = repo
        .list_entities(&EntityListQuery {
            repository_id: Some(fx.repository_id),
            include_deleted: false,
        })
        .unwrap();
    assert_eq!(
        in_payments.iter().map(|entity| entity.id).collect::<Vec<_>>(),
        vec![second.id]
    );
    assert_eq!(repo.list_entities(&EntityListQuery::default()).unwrap().len(), 2);
    assert!(repo.get_entity(first.id, false).unwrap().is_none());
    assert!(repo.get_entity(first.id, true).unwrap().unwrap().deleted_at.is_some());
}

#[test]
fn soft_delete_twice_changes_nothing_the_second_time() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqliteEntityRepository::new(&conn);
    let entity = repo
        .create_entity(&NewEntity::new(EntityKind::Struct, "A", fx.repository_id, fx.module_id))
        .unwrap();

    assert_eq!(repo.soft_delete_entity(entity.id).unwrap(), 1);
    assert_eq!(repo.soft_delete_entity(entity.id).unwrap(), 0);
}

#[test]
fn service_create_stamps_creator_and_records_audit() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let service = service(&conn);

    let created = service
        .create(
            NewEntity::new(EntityKind::Struct, "Order", fx.repository_id, fx.module_id),
            &Session::for_user(fx.owner_id),
        )
        .unwrap();

    assert_eq!(created.creator_id, Some(fx.owner_id));
    assert!(created.priority > 0);
    let trail = service.audit_trail(created.id).unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].kind, AuditKind::Create);
    assert_eq!(trail[0].user_id, Some(fx.owner_id));
    assert_eq!(trail[0].repository_id, Some(fx.repository_id));
    assert_eq!(trail[0].module_id, Some(fx.module_id));
}

#[test]
fn service_create_requires_login_and_repository_access() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let service = service(&conn);
    let payload = NewEntity::new(EntityKind::Struct, "Order", fx.repository_id, fx.module_id);

    let anonymous = service.create(payload.clone(), &Session::anonymous()).unwrap_err();
    assert!(matches!(anonymous, ServiceError::NotAuthenticated));

    let outsider = service
        .create(payload, &Session::for_user(fx.outsider_id))
        .unwrap_err();
    assert!(matches!(outsider, ServiceError::AccessDenied));
    assert_eq!(service.count().unwrap(), 0);
}

#[test]
fn members_gain_write_access() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    SqliteCatalogRepository::new(&conn)
        .add_member(fx.repository_id, fx.outsider_id)
        .unwrap();

    let created = service(&conn)
        .create(
            NewEntity::new(EntityKind::Union, "Shape", fx.repository_id, fx.module_id),
            &Session::for_user(fx.outsider_id),
        )
        .unwrap();
    assert_eq!(created.creator_id, Some(fx.outsider_id));
}

#[test]
fn update_applies_patch_and_skips_audit_when_nothing_changed() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let service = service(&conn);
    let session = Session::for_user(fx.owner_id);
    let created = service
        .create(
            NewEntity::new(EntityKind::Struct, "Order", fx.repository_id, fx.module_id),
            &session,
        )
        .unwrap();

    let mut patch = EntityPatch::new(created.id);
    patch.name = Some("PurchaseOrder".to_string());
    patch.kind = Some(EntityKind::Exception);
    let outcome = service.update(&patch, &session).unwrap();
    assert_eq!(outcome.rows, 1);
    let updated = outcome.entity.unwrap();
    assert_eq!(updated.name, "PurchaseOrder");
    assert_eq!(updated.kind, EntityKind::Exception);
    assert_eq!(updated.namespace, created.namespace);

    SqliteEntityRepository::new(&conn)
        .soft_delete_entity(created.id)
        .unwrap();
    let outcome = service.update(&patch, &session).unwrap();
    assert_eq!(outcome.rows, 0);
    assert!(outcome.entity.is_none());

    let kinds: Vec<AuditKind> = service
        .audit_trail(created.id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds, vec![AuditKind::Update, AuditKind::Create]);
}

#[test]
fn remove_cascades_to_own_properties_only() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let service = service(&conn);
    let properties = SqlitePropertyRepository::new(&conn);
    let session = Session::for_user(fx.owner_id);

    let doomed = service
        .create(
            NewEntity::new(EntityKind::Struct, "Doomed", fx.repository_id, fx.module_id),
            &session,
        )
        .unwrap();
    let kept = service
        .create(
            NewEntity::new(EntityKind::Struct, "Kept", fx.repository_id, fx.module_id),
            &session,
        )
        .unwrap();
    for entity_id in [doomed.id, kept.id] {
        let root = properties
            .create_property(&NewProperty::new(
                entity_id,
                PropertyScope::Request,
                PropertyType::Object,
                "payload",
            ))
            .unwrap();
        properties
            .create_property(
                &NewProperty::new(
                    entity_id,
                    PropertyScope::Request,
                    PropertyType::String,
                    "field",
                )
                .with_parent(root.id),
            )
            .unwrap();
    }

    assert_eq!(service.remove(doomed.id, &session).unwrap(), 1);

    assert!(properties.list_properties(doomed.id).unwrap().is_empty());
    assert_eq!(properties.list_properties(kept.id).unwrap().len(), 2);
    assert_eq!(service.count().unwrap(), 1);
    assert_eq!(
        service.audit_trail(doomed.id).unwrap()[0].kind,
        AuditKind::Delete
    );
}

#[test]
fn removing_deleted_entity_returns_zero_and_writes_no_audit() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let service = service(&conn);
    let session = Session::for_user(fx.owner_id);
    let created = service
        .create(
            NewEntity::new(EntityKind::Struct, "Order", fx.repository_id, fx.module_id),
            &session,
        )
        .unwrap();

    assert_eq!(service.remove(created.id, &session).unwrap(), 1);
    assert_eq!(service.remove(created.id, &session).unwrap(), 0);

    let trail = service.audit_trail(created.id).unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].kind, AuditKind::Delete);
}

#[test]
fn remove_is_denied_for_anonymous_and_outsiders() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let service = service(&conn);
    let created = service
        .create(
            NewEntity::new(EntityKind::Struct, "Order", fx.repository_id, fx.module_id),
            &Session::for_user(fx.owner_id),
        )
        .unwrap();

    for session in [Session::anonymous(), Session::for_user(fx.outsider_id)] {
        let err = service.remove(created.id, &session).unwrap_err();
        assert!(matches!(err, ServiceError::AccessDenied));
    }
    assert_eq!(service.count().unwrap(), 1);
}
