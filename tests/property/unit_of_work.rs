//! Context tracking properties

use entity_proxy::{
    ChangeRecord, Context, EntityId, EntityState, EntityStatus, LinkKind, LinkTarget, ProxyError,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;

fn status_strategy() -> impl Strategy<Value = EntityStatus> {
    prop_oneof![
        Just(EntityStatus::AttachedUnchanged),
        Just(EntityStatus::AttachedDirty),
        Just(EntityStatus::New),
        Just(EntityStatus::Deleted),
    ]
}

fn link_kind_strategy() -> impl Strategy<Value = LinkKind> {
    prop_oneof![Just(LinkKind::Add), Just(LinkKind::Remove), Just(LinkKind::Replace)]
}

/// Once deleted, an entity only accepts further deletes
#[test]
fn test_deleted_is_absorbing() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &proptest::collection::vec(status_strategy(), 1..12),
            |statuses| {
                let context = Context::new();
                let id = EntityId::keyed("Orders", 1);
                let mut deleted = false;

                for status in statuses {
                    let result = context.track(EntityState::new(id.clone()), status);
                    if deleted {
                        if status == EntityStatus::Deleted {
                            prop_assert!(result.is_ok());
                        } else {
                            let rejected = matches!(
                                result,
                                Err(ProxyError::InvalidStateTransition {
                                    from: EntityStatus::Deleted,
                                    ..
                                })
                            );
                            prop_assert!(rejected);
                        }
                        prop_assert_eq!(context.status(&id), Some(EntityStatus::Deleted));
                    }
                    deleted |= result.is_ok() && status == EntityStatus::Deleted;
                }
                Ok(())
            },
        )
        .unwrap();
}

/// Link mutations on one triple collapse to the last kind, add/remove cancel
#[test]
fn test_link_mutations_collapse() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &proptest::collection::vec((0..3u8, link_kind_strategy()), 0..24),
            |mutations| {
                let context = Context::new();
                let source = EntityId::keyed("Customers", 1);
                let mut model: HashMap<u8, LinkKind> = HashMap::new();

                for (target, kind) in mutations {
                    context.record_link_change(
                        &source,
                        "Orders",
                        LinkTarget::Entity(EntityId::keyed("Orders", target as i64)),
                        kind,
                    );
                    match model.get(&target) {
                        Some(existing) if existing.cancels(kind) => {
                            model.remove(&target);
                        }
                        _ => {
                            model.insert(target, kind);
                        }
                    }
                }

                let pending: HashMap<String, LinkKind> = context
                    .pending_changes()
                    .iter()
                    .filter_map(ChangeRecord::as_link)
                    .map(|link| (link.target.to_string(), link.kind))
                    .collect();
                let expected: HashMap<String, LinkKind> = model
                    .into_iter()
                    .map(|(target, kind)| (format!("Orders({})", target), kind))
                    .collect();
                prop_assert_eq!(pending, expected);
                Ok(())
            },
        )
        .unwrap();
}

/// Pending order follows the first mutation of each entity; the last value wins
#[test]
fn test_first_dirty_order_and_last_write_wins() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &proptest::collection::vec((0..6i64, 0..100i64), 1..40),
            |writes| {
                let context = Context::new();
                for key in 0..6 {
                    context.attach(
                        EntityState::new(EntityId::keyed("Orders", key))
                            .with_property("ShelfLife", json!(-1)),
                    );
                }

                let mut first_seen = Vec::new();
                let mut last_value = HashMap::new();
                for (key, value) in &writes {
                    context
                        .set_property(&EntityId::keyed("Orders", *key), "ShelfLife", json!(value))
                        .unwrap();
                    if !first_seen.contains(key) {
                        first_seen.push(*key);
                    }
                    last_value.insert(*key, *value);
                }

                let pending = context.pending_changes();
                let order: Vec<String> = pending
                    .iter()
                    .map(|change| change.entity_id().to_string())
                    .collect();
                let expected: Vec<String> = first_seen
                    .iter()
                    .map(|key| format!("Orders({})", key))
                    .collect();
                prop_assert_eq!(order, expected);

                for change in &pending {
                    let change = change.as_entity().unwrap();
                    let key: i64 = change.id.key().unwrap().as_str().parse().unwrap();
                    prop_assert_eq!(
                        change.properties.get("ShelfLife"),
                        Some(&json!(last_value[&key]))
                    );
                }

                for change in &pending {
                    context.acknowledge(change, None);
                }
                prop_assert!(!context.has_pending_changes());
                Ok(())
            },
        )
        .unwrap();
}
