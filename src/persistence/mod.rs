//! Persistence managers.
//!
//! Both strategies drain the same context snapshot into the same protocol
//! operations; they differ only in commit policy. The transactional manager
//! submits one all-or-nothing change set, the non-transactional one submits
//! every change as its own request and keeps going past failures.

mod non_transactional;
mod transactional;

pub use non_transactional::NonTransactionalPersistenceManager;
pub use transactional::TransactionalPersistenceManager;

use crate::client::{OperationDescriptor, UpdateType};
use crate::context::{ChangeRecord, EntityChangeKind};
use crate::error::ProxyError;
use async_trait::async_trait;

/// Commits the pending changes of a context
#[async_trait]
pub trait PersistenceManager: Send + Sync {
    /// Commit everything pending at the moment the flush starts.
    ///
    /// Committed changes are cleared from the context as they are acknowledged;
    /// anything that failed stays pending and is listed in the error.
    async fn flush(&self) -> Result<FlushReport, ProxyError>;

    fn is_transactional(&self) -> bool;
}

/// Outcome of a successful flush
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    /// Changes the service acknowledged, in submission order
    pub committed: Vec<ChangeRecord>,
    /// Number of requests sent
    pub requests: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }
}

/// Pending changes in submission order, each paired with its operation.
///
/// Creates and updates go first so link targets exist, then link mutations,
/// then deletes so no link is left pointing at a removed entity. Within a
/// phase the context's first-dirty order is kept.
#[derive(Debug, Clone, Default)]
pub struct CommitPlan {
    steps: Vec<(ChangeRecord, OperationDescriptor)>,
    update_type: UpdateType,
}

impl CommitPlan {
    pub fn from_changes(mut changes: Vec<ChangeRecord>, update_type: UpdateType) -> Self {
        changes.sort_by_key(|change| (phase(change), change.sequence()));
        let steps = changes
            .into_iter()
            .map(|change| {
                let operation = describe(&change, update_type);
                (change, operation)
            })
            .collect();
        Self { steps, update_type }
    }

    pub fn update_type(&self) -> UpdateType {
        self.update_type
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn changes(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.steps.iter().map(|(change, _)| change)
    }

    pub fn operations(&self) -> Vec<OperationDescriptor> {
        self.steps
            .iter()
            .map(|(_, operation)| operation.clone())
            .collect()
    }

    pub fn into_changes(self) -> Vec<ChangeRecord> {
        self.steps.into_iter().map(|(change, _)| change).collect()
    }
}

fn phase(change: &ChangeRecord) -> u8 {
    match change {
        ChangeRecord::Entity(entity) if entity.kind == EntityChangeKind::Delete => 2,
        ChangeRecord::Entity(_) => 0,
        ChangeRecord::Link(_) => 1,
    }
}

/// The protocol operation that commits `change`.
pub(crate) fn describe(change: &ChangeRecord, update_type: UpdateType) -> OperationDescriptor {
    match change {
        ChangeRecord::Entity(entity) => match entity.kind {
            EntityChangeKind::Create => OperationDescriptor::CreateEntity {
                id: entity.id.clone(),
                properties: entity.properties.clone(),
            },
            EntityChangeKind::Update => OperationDescriptor::UpdateEntity {
                id: entity.id.clone(),
                properties: entity.properties.clone(),
                etag: entity.etag.clone(),
                update_type,
            },
            EntityChangeKind::Delete => OperationDescriptor::DeleteEntity {
                id: entity.id.clone(),
                etag: entity.etag.clone(),
            },
        },
        ChangeRecord::Link(link) => OperationDescriptor::UpdateLink {
            source: link.source.clone(),
            navigation: link.navigation.clone(),
            target: link.target.clone(),
            kind: link.kind,
        },
    }
}
