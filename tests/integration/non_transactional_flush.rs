//! Change-by-change commits

use super::support::{service, DemoService};
use entity_proxy::{
    ChangeRecord, EntityId, EntityKey, EntityState, EntityStatus, LinkTarget, OperationDescriptor,
    ProxyError, TransportError,
};
use serde_json::json;

fn order(key: i64) -> EntityState {
    EntityState::new(EntityId::keyed("Orders", key)).with_property("ShelfLife", json!(1))
}

fn pending_ids(changes: &[ChangeRecord]) -> Vec<String> {
    changes
        .iter()
        .map(|change| change.entity_id().to_string())
        .collect()
}

#[tokio::test]
async fn test_new_order_is_committed_with_one_request() {
    let (service, client) = service(false);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();

    let order = orders.new_entity(Some(EntityKey::from(9))).unwrap();
    order.set_property("ShelfLife", json!(30)).unwrap();

    let report = service.flush().await.unwrap();

    assert_eq!(client.request_log(), vec!["POST Orders(9)"]);
    assert!(client.batches().is_empty());
    assert_eq!(report.requests, 1);
    assert_eq!(report.committed.len(), 1);
    assert!(service.context().pending_changes().is_empty());
    assert_eq!(order.status(), Some(EntityStatus::AttachedUnchanged));
    assert_eq!(
        client.stored(order.id()).unwrap().properties.get("ShelfLife"),
        Some(&json!(30))
    );
}

#[tokio::test]
async fn test_failed_items_stay_pending_others_clear() {
    let (service, client) = service(false);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    for key in 1..=5 {
        client.seed(order(key));
    }
    let handles: Vec<_> = (1..=5).map(|key| orders.attach(order(key)).unwrap()).collect();
    for handle in &handles {
        handle.set_property("ShelfLife", json!(2)).unwrap();
    }
    client.fail_on(
        "PATCH Orders(2)",
        TransportError::Status {
            code: 500,
            message: "boom".to_string(),
        },
    );
    client.fail_on("PATCH Orders(4)", TransportError::Connection("reset".to_string()));

    let err = service.flush().await.unwrap_err();

    match &err {
        ProxyError::CommitFailed {
            failures,
            committed,
        } => {
            assert_eq!(*committed, 3);
            let failed: Vec<String> = failures
                .iter()
                .map(|f| f.change.entity_id().to_string())
                .collect();
            assert_eq!(failed, vec!["Orders(2)", "Orders(4)"]);
        }
        other => panic!("expected CommitFailed, got {:?}", other),
    }
    assert!(err.is_retriable());
    assert_eq!(client.requests().len(), 5);
    assert_eq!(
        pending_ids(&service.context().pending_changes()),
        vec!["Orders(2)", "Orders(4)"]
    );
    assert_eq!(handles[0].status(), Some(EntityStatus::AttachedUnchanged));
    assert_eq!(handles[1].status(), Some(EntityStatus::AttachedDirty));

    // Only the failed subset goes out again.
    client.clear_failures();
    service.flush().await.unwrap();
    assert_eq!(
        &client.request_log()[5..],
        &["PATCH Orders(2)".to_string(), "PATCH Orders(4)".to_string()]
    );
    assert!(!service.context().has_pending_changes());
}

#[tokio::test]
async fn test_stale_version_is_a_conflict_and_stays_dirty() {
    let (service, client) = service(false);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    let handle = orders
        .attach(order(1).with_etag("W/\"1\""))
        .unwrap();
    handle.set_property("ShelfLife", json!(5)).unwrap();
    client.fail_on(
        "PATCH Orders(1)",
        TransportError::PreconditionFailed("W/\"1\"".to_string()),
    );

    let err = service.flush().await.unwrap_err();

    assert!(matches!(
        err,
        ProxyError::ConcurrencyConflict { committed: 0, .. }
    ));
    assert_eq!(err.failed_changes().len(), 1);
    assert_eq!(handle.status(), Some(EntityStatus::AttachedDirty));
}

#[tokio::test]
async fn test_committed_new_entity_becomes_attached() {
    let (service, _client) = service(false);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    let handle = orders.new_entity(Some(EntityKey::from(9))).unwrap();
    handle.set_property("ShelfLife", json!(1)).unwrap();

    service.flush().await.unwrap();
    service
        .context()
        .track(
            EntityState::new(EntityId::keyed("Orders", 9)).with_property("ShelfLife", json!(2)),
            EntityStatus::AttachedDirty,
        )
        .unwrap();

    assert_eq!(handle.status(), Some(EntityStatus::AttachedDirty));
    let pending = service.context().pending_changes();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].as_entity().unwrap().properties.get("ShelfLife"),
        Some(&json!(2))
    );
}

#[tokio::test]
async fn test_server_assigned_key_is_adopted() {
    let (service, client) = service(false);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    let handle = orders.new_entity(None).unwrap();
    handle.set_property("ShelfLife", json!(7)).unwrap();

    service.flush().await.unwrap();

    assert_eq!(handle.key(), Some(EntityKey::from(1000)));
    let state = handle.state().unwrap();
    assert_eq!(state.etag.as_deref(), Some("W/\"1\""));

    // Reading it back by key is an identity-map hit.
    let again = orders.get(1000).await.unwrap();
    assert_eq!(again.id(), handle.id());
    assert_eq!(client.requests().len(), 1);
}

#[tokio::test]
async fn test_keyless_entity_is_addressed_by_assigned_key() {
    let (service, client) = service(false);
    let container = service.container::<DemoService>().unwrap();
    let orders = container.entity_set("Orders").unwrap();
    let customer = container
        .entity_set("Customers")
        .unwrap()
        .attach(EntityState::new(EntityId::keyed("Customers", 1)))
        .unwrap();

    let handle = orders.new_entity(None).unwrap();
    handle.set_property("ShelfLife", json!(7)).unwrap();
    customer.add_link("Orders", &handle).unwrap();
    service.flush().await.unwrap();

    // The link was snapshotted before the create; it goes out under the new key.
    let assigned = EntityId::keyed("Orders", 1000);
    assert_eq!(handle.key(), Some(EntityKey::from(1000)));
    match &client.requests()[1] {
        OperationDescriptor::UpdateLink {
            target: LinkTarget::Entity(target),
            ..
        } => assert_eq!(target, &assigned),
        other => panic!("expected a link update, got {:?}", other),
    }

    handle.set_property("ShelfLife", json!(8)).unwrap();
    service.flush().await.unwrap();
    assert_eq!(client.request_log()[2], "PATCH Orders(1000)");
    assert_eq!(
        client.stored(&assigned).unwrap().properties.get("ShelfLife"),
        Some(&json!(8))
    );
    assert!(!service.context().has_pending_changes());

    orders.delete(1000).unwrap();
    service.flush().await.unwrap();
    assert_eq!(client.request_log()[3], "DELETE Orders(1000)");
    assert!(client.stored(&assigned).is_none());
    assert!(!service.context().is_tracked(handle.id()));
}

#[tokio::test]
async fn test_delete_is_committed_and_forgotten() {
    let (service, client) = service(false);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    client.seed(order(1));
    let handle = orders.attach(order(1)).unwrap();

    handle.delete().unwrap();
    assert!(matches!(
        handle.set_property("ShelfLife", json!(3)),
        Err(ProxyError::InvalidStateTransition { .. })
    ));
    service.flush().await.unwrap();

    assert_eq!(client.request_log(), vec!["DELETE Orders(1)"]);
    assert!(!service.context().is_tracked(handle.id()));
}

#[tokio::test]
async fn test_new_then_deleted_sends_nothing() {
    let (service, client) = service(false);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    let handle = orders.new_entity(None).unwrap();
    handle.set_property("ShelfLife", json!(3)).unwrap();
    handle.delete().unwrap();

    let report = service.flush().await.unwrap();

    assert!(report.is_empty());
    assert_eq!(report.requests, 0);
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_links_follow_the_entities_they_reference() {
    let (service, client) = service(false);
    let container = service.container::<DemoService>().unwrap();
    let customers = container.entity_set("Customers").unwrap();
    let orders = container.entity_set("Orders").unwrap();

    let customer = customers
        .attach(EntityState::new(EntityId::keyed("Customers", 1)))
        .unwrap();
    client.seed(order(3));
    let stale = orders.attach(order(3)).unwrap();
    stale.delete().unwrap();
    let order = orders.new_entity(Some(EntityKey::from(9))).unwrap();
    customer.add_link("Orders", &order).unwrap();

    service.flush().await.unwrap();

    assert_eq!(
        client.request_log(),
        vec![
            "POST Orders(9)",
            "add Customers(1)/Orders/$ref",
            "DELETE Orders(3)"
        ]
    );
}

#[tokio::test]
async fn test_linking_untracked_or_deleted_entities_fails() {
    let (service, _client) = service(false);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    let a = orders.attach(order(1)).unwrap();
    let b = orders.attach(order(2)).unwrap();
    b.delete().unwrap();

    assert!(matches!(
        a.set_link("Replacement", &b),
        Err(ProxyError::InvalidStateTransition { .. })
    ));

    service.context().detach(a.id());
    assert!(matches!(
        a.unset_link("Replacement"),
        Err(ProxyError::UntrackedEntity(_))
    ));
}

#[tokio::test]
async fn test_empty_flush_sends_nothing() {
    let (service, client) = service(false);

    let report = service.flush().await.unwrap();

    assert!(report.is_empty());
    assert_eq!(report.requests, 0);
    assert!(client.requests().is_empty());
}
