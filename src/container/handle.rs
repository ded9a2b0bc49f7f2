use crate::context::Context;
use crate::error::ProxyError;
use crate::types::{EntityId, EntityKey, EntityState, EntityStatus, LinkKind, LinkTarget};
use std::sync::Arc;

/// Typed access to one tracked entity.
///
/// Handles are cheap to clone; all state lives in the context, so two handles
/// for the same entity always agree.
#[derive(Clone)]
pub struct EntityHandle {
    id: EntityId,
    context: Arc<Context>,
}

impl EntityHandle {
    pub(crate) fn new(id: EntityId, context: Arc<Context>) -> Self {
        Self { id, context }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Service key, once known
    pub fn key(&self) -> Option<EntityKey> {
        self.context.key_of(&self.id)
    }

    pub fn status(&self) -> Option<EntityStatus> {
        self.context.status(&self.id)
    }

    pub fn state(&self) -> Option<EntityState> {
        self.context.entity(&self.id)
    }

    pub fn property(&self, name: &str) -> Option<serde_json::Value> {
        self.state()
            .and_then(|mut state| state.properties.remove(name))
    }

    pub fn set_property(
        &self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), ProxyError> {
        self.context.set_property(&self.id, name, value)
    }

    /// Add `target` to collection navigation `navigation`.
    pub fn add_link(&self, navigation: &str, target: &EntityHandle) -> Result<(), ProxyError> {
        self.link(navigation, LinkTarget::Entity(target.id.clone()), LinkKind::Add)
    }

    /// Remove `target` from collection navigation `navigation`.
    pub fn remove_link(&self, navigation: &str, target: &EntityHandle) -> Result<(), ProxyError> {
        self.link(navigation, LinkTarget::Entity(target.id.clone()), LinkKind::Remove)
    }

    /// Point single-valued navigation `navigation` at `target`.
    pub fn set_link(&self, navigation: &str, target: &EntityHandle) -> Result<(), ProxyError> {
        self.link(navigation, LinkTarget::Entity(target.id.clone()), LinkKind::Replace)
    }

    /// Clear single-valued navigation `navigation`.
    pub fn unset_link(&self, navigation: &str) -> Result<(), ProxyError> {
        self.link(navigation, LinkTarget::Unset, LinkKind::Remove)
    }

    fn link(&self, navigation: &str, target: LinkTarget, kind: LinkKind) -> Result<(), ProxyError> {
        self.ensure_linkable(&self.id)?;
        if let LinkTarget::Entity(target) = &target {
            self.ensure_linkable(target)?;
        }
        self.context
            .record_link_change(&self.id, navigation, target, kind);
        Ok(())
    }

    fn ensure_linkable(&self, id: &EntityId) -> Result<(), ProxyError> {
        match self.context.status(id) {
            None => Err(ProxyError::UntrackedEntity(id.clone())),
            Some(EntityStatus::Deleted) => Err(ProxyError::InvalidStateTransition {
                id: id.clone(),
                from: EntityStatus::Deleted,
                to: EntityStatus::AttachedDirty,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Mark the entity for deletion on the next flush.
    pub fn delete(&self) -> Result<(), ProxyError> {
        self.context
            .track(EntityState::new(self.id.clone()), EntityStatus::Deleted)?;
        Ok(())
    }
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandle").field("id", &self.id).finish()
    }
}
