//! All-or-nothing commits

use super::support::{configured_service, service, DemoService};
use entity_proxy::config::ServiceConfig;
use entity_proxy::{
    EntityId, EntityKey, EntityState, EntityStatus, ProxyError, TransportError, UpdateType,
};
use serde_json::json;
use std::sync::Arc;

fn order(key: i64) -> EntityState {
    EntityState::new(EntityId::keyed("Orders", key)).with_property("ShelfLife", json!(1))
}

#[tokio::test]
async fn test_successful_change_set_clears_everything() {
    let (service, client) = service(true);
    let container = service.container::<DemoService>().unwrap();
    let orders = container.entity_set("Orders").unwrap();
    let customers = container.entity_set("Customers").unwrap();

    client.seed(order(1));
    client.seed(order(3));
    let existing = orders.attach(order(1)).unwrap();
    existing.set_property("ShelfLife", json!(4)).unwrap();
    let customer = customers
        .attach(EntityState::new(EntityId::keyed("Customers", 5)))
        .unwrap();
    let created = orders.new_entity(Some(EntityKey::from(2))).unwrap();
    customer.set_link("FavoriteOrder", &created).unwrap();
    orders.delete(3).unwrap();

    let report = service.flush().await.unwrap();

    assert_eq!(report.requests, 1);
    assert_eq!(report.committed.len(), 4);
    assert!(client.requests().is_empty());
    let batches = client.batches();
    assert_eq!(batches.len(), 1);
    let batch: Vec<String> = batches[0].iter().map(|op| op.to_string()).collect();
    assert_eq!(
        batch,
        vec![
            "PATCH Orders(1)",
            "POST Orders(2)",
            "replace Customers(5)/FavoriteOrder/$ref",
            "DELETE Orders(3)",
        ]
    );
    assert!(!service.context().has_pending_changes());
    assert_eq!(created.status(), Some(EntityStatus::AttachedUnchanged));
}

#[tokio::test]
async fn test_rolled_back_change_set_leaves_context_untouched() {
    let (service, client) = service(true);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    for key in 1..=5 {
        orders
            .attach(order(key))
            .unwrap()
            .set_property("ShelfLife", json!(key * 10))
            .unwrap();
    }
    client.fail_on(
        "PATCH Orders(3)",
        TransportError::Status {
            code: 400,
            message: "bad value".to_string(),
        },
    );
    let before = service.context().pending_changes();

    let err = service.flush().await.unwrap_err();

    assert_eq!(service.context().pending_changes(), before);
    match &err {
        ProxyError::CommitFailed {
            failures,
            committed,
        } => {
            assert_eq!(*committed, 0);
            assert_eq!(failures.len(), 5);
            let explicit: Vec<_> = failures
                .iter()
                .filter(|f| f.error != TransportError::RolledBack)
                .collect();
            assert_eq!(explicit.len(), 1);
            assert_eq!(explicit[0].change.entity_id().to_string(), "Orders(3)");
        }
        other => panic!("expected CommitFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_failure_is_retriable() {
    let (service, client) = service(true);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    orders.new_entity(Some(EntityKey::from(9))).unwrap();
    orders.new_entity(Some(EntityKey::from(10))).unwrap();
    client.fail_batches(TransportError::Timeout("gateway".to_string()));
    let before = service.context().pending_changes();

    let err = service.flush().await.unwrap_err();
    assert!(err.is_retriable());
    assert_eq!(err.failed_changes().len(), 2);
    assert_eq!(service.context().pending_changes(), before);

    client.clear_failures();
    let report = service.flush().await.unwrap();
    assert_eq!(report.committed.len(), 2);
    assert_eq!(client.batches().len(), 2);
    assert!(!service.context().has_pending_changes());
}

#[tokio::test]
async fn test_conflicting_change_set_reports_concurrency_conflict() {
    let (service, client) = service(true);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    let handle = orders.attach(order(1).with_etag("W/\"7\"")).unwrap();
    handle.set_property("ShelfLife", json!(2)).unwrap();
    orders.attach(order(2)).unwrap().set_property("ShelfLife", json!(2)).unwrap();
    client.fail_on(
        "PATCH Orders(1)",
        TransportError::Status {
            code: 412,
            message: "etag mismatch".to_string(),
        },
    );

    let err = service.flush().await.unwrap_err();

    assert!(matches!(err, ProxyError::ConcurrencyConflict { .. }));
    assert_eq!(err.failed_changes().len(), 2);
    assert_eq!(handle.status(), Some(EntityStatus::AttachedDirty));
    assert_eq!(service.context().pending_changes().len(), 2);
}

#[tokio::test]
async fn test_change_recorded_during_flush_stays_pending() {
    let (service, client) = service(true);
    let service = Arc::new(service);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    client.seed(order(1));
    let handle = orders.attach(order(1)).unwrap();
    handle.set_property("ShelfLife", json!(2)).unwrap();
    let gate = client.gate_batches();

    let flushing = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.flush().await })
    };
    gate.entered.notified().await;
    handle.set_property("ShelfLife", json!(3)).unwrap();
    gate.release.notify_one();
    let report = flushing.await.unwrap().unwrap();

    assert_eq!(report.committed.len(), 1);
    assert_eq!(
        report.committed[0].as_entity().unwrap().properties.get("ShelfLife"),
        Some(&json!(2))
    );
    let pending = service.context().pending_changes();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].as_entity().unwrap().properties.get("ShelfLife"),
        Some(&json!(3))
    );
    assert_eq!(handle.status(), Some(EntityStatus::AttachedDirty));
}

#[tokio::test]
async fn test_created_entity_is_updated_under_its_assigned_key() {
    let (service, client) = service(true);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    let handle = orders.new_entity(None).unwrap();
    handle.set_property("ShelfLife", json!(7)).unwrap();
    service.flush().await.unwrap();

    handle.set_property("ShelfLife", json!(9)).unwrap();
    service.flush().await.unwrap();

    let batches = client.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1][0].to_string(), "PATCH Orders(1000)");
    assert_eq!(
        client
            .stored(&EntityId::keyed("Orders", 1000))
            .unwrap()
            .properties
            .get("ShelfLife"),
        Some(&json!(9))
    );
}

#[tokio::test]
async fn test_replace_updates_send_the_full_entity() {
    let config = ServiceConfig {
        update_type: UpdateType::Replace,
        ..ServiceConfig::default()
    };
    let (service, client) = configured_service(&config);
    assert_eq!(service.update_type(), UpdateType::Replace);
    let orders = service.container::<DemoService>().unwrap().entity_set("Orders").unwrap();
    let state = order(1).with_property("Description", json!("first"));
    client.seed(state.clone());
    let handle = orders.attach(state).unwrap();

    handle.set_property("ShelfLife", json!(12)).unwrap();
    service.flush().await.unwrap();

    let batch: Vec<String> = client.batches()[0].iter().map(|op| op.to_string()).collect();
    assert_eq!(batch, vec!["PUT Orders(1)"]);
    let stored = client.stored(&EntityId::keyed("Orders", 1)).unwrap();
    assert_eq!(stored.properties.get("ShelfLife"), Some(&json!(12)));
    assert_eq!(stored.properties.get("Description"), Some(&json!("first")));
}
