use apidoc_core::db::open_db_in_memory;
use apidoc_core::model::audit::AuditKind;
use apidoc_core::model::catalog::Visibility;
use apidoc_core::model::user::NewUser;
use apidoc_core::repo::audit_repo::SqliteAuditLogRepository;
use apidoc_core::repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
use apidoc_core::repo::property_repo::{PropertyRepository, SqlitePropertyRepository};
use apidoc_core::repo::user_repo::{SqliteUserRepository, UserRepository};
use apidoc_core::tree::literal::{ExtendedValue, ToExtended};
use apidoc_core::{
    array_to_tree, parse_with_extended_literals, stringify_with_extended_literals, Entity,
    EntityKind, EntityRepository, EntityService, MoveOp, MoveRequest, NewEntity, NewProperty,
    ParamPosition, Property, PropertyScope, PropertyType, ServiceError, Session,
    SqliteAccessControl, SqliteEntityRepository,
};
use rusqlite::Connection;
use std::collections::HashMap;

type Service<'conn> = EntityService<
    SqliteEntityRepository<'conn>,
    SqlitePropertyRepository<'conn>,
    SqliteAccessControl<'conn>,
    SqliteAuditLogRepository<'conn>,
>;

struct Fixture {
    owner_id: i64,
    repository_id: i64,
    module_id: i64,
    entity: Entity,
}

fn seed(conn: &Connection) -> Fixture {
    let owner = SqliteUserRepository::new(conn)
        .create_user(&NewUser::new("Owner", "owner@example.com"))
        .unwrap();
    let catalog = SqliteCatalogRepository::new(conn);
    let repository = catalog
        .create_repository("payments", owner.id, Visibility::Private)
        .unwrap();
    let module = catalog.create_module(repository.id, "orders").unwrap();
    let entity = SqliteEntityRepository::new(conn)
        .create_entity(&NewEntity::new(
            EntityKind::Struct,
            "Order",
            repository.id,
            module.id,
        ))
        .unwrap();
    Fixture {
        owner_id: owner.id,
        repository_id: repository.id,
        module_id: module.id,
        entity,
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

fn add(
    repo: &SqlitePropertyRepository<'_>,
    entity_id: i64,
    scope: PropertyScope,
    name: &str,
    parent_id: Option<i64>,
) -> Property {
    let mut property = NewProperty::new(entity_id, scope, PropertyType::Object, name);
    property.parent_id = parent_id;
    repo.create_property(&property).unwrap()
}

fn names(branches: &[apidoc_core::Branch<Property>]) -> Vec<(String, u32, Vec<String>)> {
    branches
        .iter()
        .map(|branch| {
            (
                branch.item.name.clone(),
                branch.depth,
                branch
                    .children
                    .iter()
                    .map(|child| child.item.name.clone())
                    .collect(),
            )
        })
        .collect()
}

#[test]
fn stored_properties_build_one_tree_per_scope() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqlitePropertyRepository::new(&conn);

    let body = add(&repo, fx.entity.id, PropertyScope::Request, "body", None);
    add(&repo, fx.entity.id, PropertyScope::Request, "amount", Some(body.id));
    add(&repo, fx.entity.id, PropertyScope::Request, "currency", Some(body.id));
    add(&repo, fx.entity.id, PropertyScope::Response, "status", None);

    let detail = service(&conn)
        .get(fx.entity.id, &Session::for_user(fx.owner_id))
        .unwrap();

    assert_eq!(detail.properties.len(), 4);
    assert_eq!(
        names(&detail.request_properties.children),
        vec![(
            "body".to_string(),
            1,
            vec!["amount".to_string(), "currency".to_string()]
        )]
    );
    assert_eq!(detail.request_properties.children[0].children[0].depth, 2);
    assert_eq!(
        names(&detail.response_properties.children),
        vec![("status".to_string(), 1, Vec::new())]
    );
}

#[test]
fn preorder_flattening_preserves_every_node_and_link() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqlitePropertyRepository::new(&conn);

    let a = add(&repo, fx.entity.id, PropertyScope::Response, "a", None);
    let b = add(&repo, fx.entity.id, PropertyScope::Response, "b", Some(a.id));
    add(&repo, fx.entity.id, PropertyScope::Response, "c", Some(b.id));
    add(&repo, fx.entity.id, PropertyScope::Response, "d", Some(a.id));
    add(&repo, fx.entity.id, PropertyScope::Response, "e", None);

    let stored = repo.list_properties(fx.entity.id).unwrap();
    let tree = array_to_tree(stored.clone());
    assert_eq!(tree.len(), stored.len());

    let flattened = tree.into_preorder();
    let order: Vec<&str> = flattened.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c", "d", "e"]);
    let parents: HashMap<i64, Option<i64>> =
        stored.iter().map(|p| (p.id, p.parent_id)).collect();
    for property in &flattened {
        assert_eq!(parents[&property.id], property.parent_id);
    }
}

#[test]
fn orphans_become_roots_and_cycles_terminate() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqlitePropertyRepository::new(&conn);

    let orphan = add(&repo, fx.entity.id, PropertyScope::Request, "orphan", Some(9_999));
    let a = add(&repo, fx.entity.id, PropertyScope::Request, "a", None);
    let b = add(&repo, fx.entity.id, PropertyScope::Request, "b", Some(a.id));
    conn.execute(
        "UPDATE properties SET parent_id = ?1 WHERE id = ?2;",
        [b.id, a.id],
    )
    .unwrap();

    let detail = service(&conn)
        .get(fx.entity.id, &Session::for_user(fx.owner_id))
        .unwrap();
    let tree = &detail.request_properties;

    assert_eq!(tree.len(), 3);
    assert_eq!(tree.children[0].item.id, orphan.id);
    let mut seen: Vec<i64> = tree.clone().into_preorder().iter().map(|p| p.id).collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![orphan.id, a.id, b.id]);
}

#[test]
fn detail_view_renders_regexp_and_function_values_as_literals() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqlitePropertyRepository::new(&conn);

    let mut email = NewProperty::new(
        fx.entity.id,
        PropertyScope::Request,
        PropertyType::RegExp,
        "email",
    )
    .with_value(r"/^\S+@\S+$/i");
    email.pos = Some(ParamPosition::BodyParams);
    repo.create_property(&email).unwrap();
    repo.create_property(
        &NewProperty::new(
            fx.entity.id,
            PropertyScope::Request,
            PropertyType::Function,
            "token",
        )
        .with_value("function () { return Date.now() }"),
    )
    .unwrap();
    repo.create_property(
        &NewProperty::new(
            fx.entity.id,
            PropertyScope::Request,
            PropertyType::RegExp,
            "loose",
        )
        .with_value("not a literal"),
    )
    .unwrap();

    let detail = service(&conn)
        .get(fx.entity.id, &Session::for_user(fx.owner_id))
        .unwrap();
    let text = stringify_with_extended_literals(&detail).unwrap();
    let parsed = parse_with_extended_literals(&text).unwrap();

    let ExtendedValue::Array(request) = parsed.get("requestProperties").unwrap() else {
        panic!("requestProperties should be an array");
    };
    assert_eq!(
        request[0].get("value"),
        Some(&ExtendedValue::RegExp(r"/^\S+@\S+$/i".to_string()))
    );
    assert_eq!(request[0].get("pos"), Some(&ExtendedValue::from(3_i64)));
    assert_eq!(
        request[1].get("value"),
        Some(&ExtendedValue::Function(
            "function () { return Date.now() }".to_string()
        ))
    );
    assert_eq!(
        request[2].get("value"),
        Some(&ExtendedValue::from("not a literal"))
    );
    assert_eq!(request[0].get("depth"), Some(&ExtendedValue::from(1_u32)));
    assert_eq!(
        detail.to_extended().get("name"),
        Some(&ExtendedValue::from("Order"))
    );
}

#[test]
fn copy_duplicates_properties_with_remapped_parents() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let repo = SqlitePropertyRepository::new(&conn);
    let target_module = SqliteCatalogRepository::new(&conn)
        .create_module(fx.repository_id, "archive")
        .unwrap();

    let body = add(&repo, fx.entity.id, PropertyScope::Request, "body", None);
    let item = add(&repo, fx.entity.id, PropertyScope::Request, "item", Some(body.id));
    add(&repo, fx.entity.id, PropertyScope::Request, "sku", Some(item.id));
    add(&repo, fx.entity.id, PropertyScope::Response, "ok", None);
    SqliteEntityRepository::new(&conn)
        .acquire_lock(fx.entity.id, fx.owner_id)
        .unwrap();

    let service = service(&conn);
    let copy = service
        .move_entity(
            &MoveRequest {
                entity_id: fx.entity.id,
                module_id: target_module.id,
                op: MoveOp::Copy,
                repository_id: None,
            },
            &Session::for_user(fx.owner_id),
        )
        .unwrap();

    assert_ne!(copy.id, fx.entity.id);
    assert_eq!(copy.module_id, target_module.id);
    assert_eq!(copy.name, "Order");
    assert!(copy.locker_id.is_none());
    assert_eq!(copy.creator_id, Some(fx.owner_id));

    let copied = repo.list_properties(copy.id).unwrap();
    assert_eq!(copied.len(), 4);
    let by_name: HashMap<&str, &Property> =
        copied.iter().map(|p| (p.name.as_str(), p)).collect();
    assert_eq!(by_name["item"].parent_id, Some(by_name["body"].id));
    assert_eq!(by_name["sku"].parent_id, Some(by_name["item"].id));
    assert_eq!(by_name["ok"].parent_id, None);
    assert_eq!(by_name["ok"].scope, PropertyScope::Response);
    assert_eq!(repo.list_properties(fx.entity.id).unwrap().len(), 4);
    assert_eq!(
        service.audit_trail(copy.id).unwrap()[0].kind,
        AuditKind::Create
    );
}

#[test]
fn move_relocates_within_repository_and_rejects_foreign_modules() {
    let conn = open_db_in_memory().unwrap();
    let fx = seed(&conn);
    let catalog = SqliteCatalogRepository::new(&conn);
    let target_module = catalog.create_module(fx.repository_id, "archive").unwrap();
    let foreign_repository = catalog
        .create_repository("other", fx.owner_id, Visibility::Private)
        .unwrap();
    let foreign_module = catalog.create_module(foreign_repository.id, "misc").unwrap();
    let service = service(&conn);
    let session = Session::for_user(fx.owner_id);

    let moved = service
        .move_entity(
            &MoveRequest {
                entity_id: fx.entity.id,
                module_id: target_module.id,
                op: MoveOp::Move,
                repository_id: None,
            },
            &session,
        )
        .unwrap();
    assert_eq!(moved.id, fx.entity.id);
    assert_eq!(moved.module_id, target_module.id);
    assert_eq!(moved.repository_id, fx.repository_id);

    let err = service
        .move_entity(
            &MoveRequest {
                entity_id: fx.entity.id,
                module_id: foreign_module.id,
                op: MoveOp::Move,
                repository_id: Some(fx.repository_id),
            },
            &session,
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccessDenied));
    let stored = SqliteEntityRepository::new(&conn)
        .get_entity(fx.entity.id, false)
        .unwrap()
        .unwrap();
    assert_ne!(stored.module_id, fx.module_id);
    assert_eq!(stored.module_id, target_module.id);
}
