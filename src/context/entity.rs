//! Tracked entity state and its status transitions.

use super::change::{EntityChange, EntityChangeKind};
use crate::client::UpdateType;
use crate::types::{EntityId, EntityKey, EntityState, EntityStatus, PropertyMap};
use std::collections::BTreeMap;

/// Status an entity ends up in when `requested` is applied on top of `current`,
/// or `None` when the transition is not allowed.
pub(crate) fn resolve_transition(
    current: EntityStatus,
    requested: EntityStatus,
) -> Option<EntityStatus> {
    use EntityStatus::*;

    match (current, requested) {
        (Deleted, Deleted) => Some(Deleted),
        (Deleted, _) => None,
        (_, Deleted) => Some(Deleted),
        // Mutating a new entity folds into its pending create.
        (New, New) | (New, AttachedDirty) => Some(New),
        (New, AttachedUnchanged) => None,
        (AttachedUnchanged, AttachedUnchanged) => Some(AttachedUnchanged),
        (AttachedUnchanged, AttachedDirty) | (AttachedDirty, AttachedDirty) => Some(AttachedDirty),
        (AttachedDirty, AttachedUnchanged) => None,
        (AttachedUnchanged, New) | (AttachedDirty, New) => None,
    }
}

/// What the context should do with an entry after a commit acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    Keep,
    Remove,
}

#[derive(Debug, Clone)]
pub(crate) struct TrackedEntity {
    pub id: EntityId,
    pub status: EntityStatus,
    /// Last known property state
    pub properties: PropertyMap,
    /// Changed property -> revision of the change
    pub changed: BTreeMap<String, u64>,
    pub etag: Option<String>,
    /// Whether the service knows this entity
    pub persisted: bool,
    /// Key the service assigned to an entity created under a transient identity
    pub assigned_key: Option<EntityKey>,
    pub sequence: Option<u64>,
    pub revision: u64,
}

impl TrackedEntity {
    pub fn new(id: EntityId, state: EntityState, status: EntityStatus, revision: u64) -> Self {
        let changed = match status {
            EntityStatus::New | EntityStatus::AttachedDirty => state
                .properties
                .keys()
                .map(|name| (name.clone(), revision))
                .collect(),
            _ => BTreeMap::new(),
        };
        let persisted = match status {
            EntityStatus::New => false,
            EntityStatus::Deleted => !id.is_transient(),
            _ => true,
        };

        Self {
            id,
            status,
            properties: state.properties,
            changed,
            etag: state.etag,
            persisted,
            assigned_key: None,
            sequence: None,
            revision,
        }
    }

    /// Apply an observed state with a requested status.
    ///
    /// Returns the rejected `(current, requested)` pair on an invalid transition.
    pub fn apply(
        &mut self,
        state: EntityState,
        requested: EntityStatus,
        revision: u64,
    ) -> Result<(), (EntityStatus, EntityStatus)> {
        let next = resolve_transition(self.status, requested).ok_or((self.status, requested))?;

        match requested {
            EntityStatus::AttachedUnchanged => {
                self.properties = state.properties;
            }
            EntityStatus::AttachedDirty | EntityStatus::New => {
                let names: Vec<String> = state.properties.keys().cloned().collect();
                let mut any_changed = false;
                for (name, value) in state.properties {
                    any_changed |= self.merge_property(name, value, revision);
                }
                // An explicit dirty mark with identical values resends them all.
                if !any_changed && requested == EntityStatus::AttachedDirty && self.changed.is_empty() {
                    for name in names {
                        self.changed.insert(name, revision);
                    }
                }
            }
            EntityStatus::Deleted => {}
        }
        if state.etag.is_some() {
            self.etag = state.etag;
        }
        self.status = next;
        self.revision = revision;
        Ok(())
    }

    /// Record a single property mutation.
    pub fn set_property(
        &mut self,
        name: String,
        value: serde_json::Value,
        revision: u64,
    ) -> Result<(), (EntityStatus, EntityStatus)> {
        let next = resolve_transition(self.status, EntityStatus::AttachedDirty)
            .ok_or((self.status, EntityStatus::AttachedDirty))?;

        if self.merge_property(name, value, revision) {
            self.status = next;
            self.revision = revision;
        }
        Ok(())
    }

    /// Last-write-wins per property; returns whether the value changed.
    fn merge_property(&mut self, name: String, value: serde_json::Value, revision: u64) -> bool {
        if self.properties.get(&name) == Some(&value) {
            return false;
        }
        self.changed.insert(name.clone(), revision);
        self.properties.insert(name, value);
        true
    }

    /// Identity the service addresses this entity by.
    pub fn service_id(&self) -> EntityId {
        match (&self.id, &self.assigned_key) {
            (EntityId::Transient { entity_set, .. }, Some(key)) => {
                EntityId::keyed(entity_set.clone(), key.clone())
            }
            _ => self.id.clone(),
        }
    }

    pub fn to_change(&self, update_type: UpdateType) -> Option<EntityChange> {
        let sequence = self.sequence?;
        let (kind, properties) = match self.status {
            EntityStatus::AttachedUnchanged => return None,
            EntityStatus::New => (EntityChangeKind::Create, self.properties.clone()),
            EntityStatus::AttachedDirty if update_type == UpdateType::Replace => {
                (EntityChangeKind::Update, self.properties.clone())
            }
            EntityStatus::AttachedDirty => {
                let changed = self
                    .changed
                    .keys()
                    .filter_map(|name| {
                        self.properties
                            .get(name)
                            .map(|value| (name.clone(), value.clone()))
                    })
                    .collect();
                (EntityChangeKind::Update, changed)
            }
            // Never reached the service: nothing to delete remotely.
            EntityStatus::Deleted if !self.persisted => return None,
            EntityStatus::Deleted => (EntityChangeKind::Delete, PropertyMap::new()),
        };

        Some(EntityChange {
            id: self.service_id(),
            kind,
            properties,
            etag: self.etag.clone(),
            sequence,
            revision: self.revision,
        })
    }

    /// Fold a successful commit of `change` into the tracked state.
    ///
    /// Only the part of the state the change was taken from is cleared; anything
    /// recorded after it stays pending.
    pub fn acknowledge(&mut self, change: &EntityChange, echo: Option<&EntityState>) -> AckOutcome {
        if change.kind == EntityChangeKind::Delete {
            return AckOutcome::Remove;
        }

        self.persisted = true;
        self.changed.retain(|_, revision| *revision > change.revision);

        if let Some(echo) = echo {
            for (name, value) in &echo.properties {
                if !self.changed.contains_key(name) {
                    self.properties.insert(name.clone(), value.clone());
                }
            }
            if echo.etag.is_some() {
                self.etag = echo.etag.clone();
            }
        }

        match self.status {
            EntityStatus::Deleted => {}
            _ if self.changed.is_empty() => {
                self.status = EntityStatus::AttachedUnchanged;
                self.sequence = None;
            }
            _ => self.status = EntityStatus::AttachedDirty,
        }
        AckOutcome::Keep
    }

    /// Unconditionally mark the entity as in sync with the service.
    pub fn reset_clean(&mut self) -> AckOutcome {
        if self.status == EntityStatus::Deleted {
            return AckOutcome::Remove;
        }
        self.status = EntityStatus::AttachedUnchanged;
        self.changed.clear();
        self.persisted = true;
        self.sequence = None;
        AckOutcome::Keep
    }

    pub fn snapshot(&self) -> EntityState {
        EntityState {
            id: self.id.clone(),
            properties: self.properties.clone(),
            etag: self.etag.clone(),
        }
    }
}
