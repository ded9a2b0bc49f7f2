//! Entity-set handler: the point where entities enter the unit of work.

use super::handle::EntityHandle;
use crate::client::{OperationDescriptor, OperationResult};
use crate::error::{ProxyError, TransportError};
use crate::metadata::EntitySetShape;
use crate::service::ServiceCore;
use crate::types::{EntityId, EntityKey, EntityState, EntityStatus};
use std::sync::Arc;
use tracing::debug;

/// Handler for one entity set of a container.
///
/// Everything read through it is attached to the context as
/// `AttachedUnchanged`; everything created through it is tracked as `New`.
pub struct EntitySet {
    shape: EntitySetShape,
    core: Arc<ServiceCore>,
}

impl EntitySet {
    pub(crate) fn new(shape: EntitySetShape, core: Arc<ServiceCore>) -> Self {
        Self { shape, core }
    }

    pub fn name(&self) -> &str {
        &self.shape.name
    }

    pub fn entity_type(&self) -> &str {
        &self.shape.entity_type
    }

    fn handle(&self, id: EntityId) -> EntityHandle {
        EntityHandle::new(id, Arc::clone(&self.core.context))
    }

    async fn read(&self, operation: OperationDescriptor) -> Result<OperationResult, ProxyError> {
        let name = operation.to_string();
        self.core
            .client
            .execute(operation)
            .await
            .map_err(|source| ProxyError::OperationInvocationError {
                operation: name,
                source,
            })
    }

    /// Read every entity of the set.
    pub async fn fetch_all(&self) -> Result<Vec<EntityHandle>, ProxyError> {
        let result = self
            .read(OperationDescriptor::ReadEntitySet {
                entity_set: self.shape.name.clone(),
            })
            .await?;

        let states = match result {
            OperationResult::Entities(states) => states,
            OperationResult::Entity(state) => vec![state],
            OperationResult::Empty => Vec::new(),
            OperationResult::Value(_) => {
                return Err(self.unexpected("GET", "a value instead of entities"));
            }
        };
        debug!(entity_set = %self.shape.name, count = states.len(), "Fetched entity set");

        states
            .into_iter()
            .map(|state| self.attach(state))
            .collect()
    }

    /// Entity with `key`, served from the context when already tracked.
    pub async fn get(&self, key: impl Into<EntityKey>) -> Result<EntityHandle, ProxyError> {
        let id = EntityId::keyed(self.shape.name.clone(), key);
        if self.core.context.is_tracked(&id) {
            return Ok(self.handle(self.core.context.resolve(&id)));
        }

        let result = self
            .read(OperationDescriptor::ReadEntity { id: id.clone() })
            .await?;
        match result {
            OperationResult::Entity(state) => self.attach(state),
            _ => Err(self.unexpected("GET", &format!("no entity for {}", id))),
        }
    }

    /// Construct a new entity; without a key the service assigns one on commit.
    pub fn new_entity(&self, key: Option<EntityKey>) -> Result<EntityHandle, ProxyError> {
        let id = match key {
            Some(key) => EntityId::keyed(self.shape.name.clone(), key),
            None => EntityId::transient(self.shape.name.clone()),
        };
        let id = self
            .core
            .context
            .track(EntityState::new(id), EntityStatus::New)?;
        Ok(self.handle(id))
    }

    /// Register an entity materialized elsewhere (e.g. expanded from another read).
    pub fn attach(&self, state: EntityState) -> Result<EntityHandle, ProxyError> {
        if state.id.entity_set() != self.shape.name {
            return Err(ProxyError::InvalidArgument(format!(
                "{} does not belong to entity set {}",
                state.id, self.shape.name
            )));
        }
        let id = self.core.context.attach(state);
        Ok(self.handle(id))
    }

    /// Mark the entity with `key` for deletion on the next flush.
    pub fn delete(&self, key: impl Into<EntityKey>) -> Result<(), ProxyError> {
        let id = EntityId::keyed(self.shape.name.clone(), key);
        self.core
            .context
            .track(EntityState::new(id), EntityStatus::Deleted)?;
        Ok(())
    }

    fn unexpected(&self, verb: &str, what: &str) -> ProxyError {
        ProxyError::OperationInvocationError {
            operation: format!("{} {}", verb, self.shape.name),
            source: TransportError::Protocol(format!("unexpected response: {}", what)),
        }
    }
}

impl std::fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySet")
            .field("name", &self.shape.name)
            .field("entity_type", &self.shape.entity_type)
            .finish()
    }
}
