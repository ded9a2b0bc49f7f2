//! Unit-of-work context.
//!
//! Single source of truth for what has changed and not yet been committed:
//! every entity reachable through the proxies, with its tracking status and last
//! known state, plus every pending navigation link mutation. Entity-set handlers
//! write into it; persistence managers drain it.

mod change;
mod entity;
mod link;

pub use change::{ChangeRecord, EntityChange, EntityChangeKind, LinkChange};

use crate::client::UpdateType;
use crate::error::ProxyError;
use crate::types::{EntityId, EntityKey, EntityState, EntityStatus, LinkKind, LinkTarget};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use entity::{AckOutcome, TrackedEntity};
use link::{LinkKey, TrackedLink};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Change tracking store shared by every handler of one service.
///
/// Entity and link tables are sharded maps, so handlers working on different
/// entities rarely contend; updates to a single entity are serialized by its
/// entry lock.
pub struct Context {
    entities: DashMap<EntityId, TrackedEntity>,
    links: DashMap<LinkKey, TrackedLink>,
    /// Server-assigned identity -> transient identity the entity is tracked under
    aliases: RwLock<HashMap<EntityId, EntityId>>,
    sequence: AtomicU64,
    revision: AtomicU64,
    /// Highest revision covered by the in-flight flush snapshot, 0 when idle
    flush_revision: AtomicU64,
    update_type: UpdateType,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::with_update_type(UpdateType::default())
    }

    /// A context whose pending updates are shaped for `update_type`.
    pub fn with_update_type(update_type: UpdateType) -> Self {
        Self {
            entities: DashMap::new(),
            links: DashMap::new(),
            aliases: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            revision: AtomicU64::new(0),
            flush_revision: AtomicU64::new(0),
            update_type,
        }
    }

    pub fn update_type(&self) -> UpdateType {
        self.update_type
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Pending entities keep the sequence of the moment they first became pending.
    fn stamp_sequence(&self, entity: &mut TrackedEntity) {
        if entity.status.is_pending() {
            if entity.sequence.is_none() {
                entity.sequence = Some(self.next_sequence());
            }
        } else {
            entity.sequence = None;
        }
    }

    /// Identity an entity is tracked under (follows server-assigned aliases).
    pub fn resolve(&self, id: &EntityId) -> EntityId {
        self.aliases
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.clone())
    }

    /// Register or update an entity's tracked status.
    ///
    /// A deleted entity cannot be tracked again with any status other than
    /// `Deleted`; see [`EntityStatus`] for the allowed transitions.
    pub fn track(&self, state: EntityState, status: EntityStatus) -> Result<EntityId, ProxyError> {
        let id = self.resolve(&state.id);
        let revision = self.next_revision();

        match self.entities.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entity = occupied.get_mut();
                entity.apply(state, status, revision).map_err(|(from, to)| {
                    ProxyError::InvalidStateTransition {
                        id: id.clone(),
                        from,
                        to,
                    }
                })?;
                self.stamp_sequence(entity);
            }
            Entry::Vacant(vacant) => {
                let mut entity = TrackedEntity::new(id.clone(), state, status, revision);
                self.stamp_sequence(&mut entity);
                vacant.insert(entity);
            }
        }

        debug!(entity = %id, status = %status, "Tracked entity");
        Ok(id)
    }

    /// Register an entity materialized from a read.
    ///
    /// Untracked entities become `AttachedUnchanged`. A tracked entity keeps its
    /// identity and pending state; clean ones are refreshed with the read state.
    pub fn attach(&self, state: EntityState) -> EntityId {
        let id = self.resolve(&state.id);
        let revision = self.next_revision();

        match self.entities.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entity = occupied.get_mut();
                if entity.status == EntityStatus::AttachedUnchanged {
                    entity.properties = state.properties;
                    if state.etag.is_some() {
                        entity.etag = state.etag;
                    }
                    entity.revision = revision;
                }
            }
            Entry::Vacant(vacant) => {
                trace!(entity = %id, "Attached entity");
                vacant.insert(TrackedEntity::new(
                    id.clone(),
                    state,
                    EntityStatus::AttachedUnchanged,
                    revision,
                ));
            }
        }
        id
    }

    /// Record a single property change on a tracked entity.
    pub fn set_property(
        &self,
        id: &EntityId,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), ProxyError> {
        let id = self.resolve(id);
        let revision = self.next_revision();

        let mut entity = self
            .entities
            .get_mut(&id)
            .ok_or_else(|| ProxyError::UntrackedEntity(id.clone()))?;
        entity
            .set_property(name.into(), value, revision)
            .map_err(|(from, to)| ProxyError::InvalidStateTransition {
                id: id.clone(),
                from,
                to,
            })?;
        self.stamp_sequence(&mut entity);
        Ok(())
    }

    /// Record a navigation link mutation.
    ///
    /// Mutations of the same (source, navigation, target) collapse to the most
    /// recent kind; an add and a remove of the same link cancel each other out.
    pub fn record_link_change(
        &self,
        source: &EntityId,
        navigation: impl Into<String>,
        target: LinkTarget,
        kind: LinkKind,
    ) {
        let target = match target {
            LinkTarget::Entity(id) => LinkTarget::Entity(self.resolve(&id)),
            LinkTarget::Unset => LinkTarget::Unset,
        };
        let key = LinkKey {
            source: self.resolve(source),
            navigation: navigation.into(),
            target,
        };
        let revision = self.next_revision();
        let in_flight = self.flush_revision.load(Ordering::SeqCst);

        match self.links.entry(key) {
            Entry::Occupied(mut occupied) => {
                // A mutation already handed to a running flush cannot be
                // cancelled locally; the newer kind supersedes it instead.
                let snapshotted = in_flight != 0 && occupied.get().revision <= in_flight;
                if occupied.get().kind.cancels(kind) && !snapshotted {
                    let (key, _) = occupied.remove_entry();
                    trace!(source = %key.source, navigation = %key.navigation, "Link mutations cancelled");
                } else {
                    let link = occupied.get_mut();
                    link.kind = kind;
                    link.revision = revision;
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TrackedLink {
                    kind,
                    sequence: self.next_sequence(),
                    revision,
                });
            }
        }
    }

    /// Everything currently new, dirty or deleted, plus pending link mutations,
    /// in the order they first became pending.
    ///
    /// Records address entities the way the service knows them: by key once
    /// one is known, by transient handle before that.
    pub fn pending_changes(&self) -> Vec<ChangeRecord> {
        let mut changes: Vec<ChangeRecord> = self
            .entities
            .iter()
            .filter_map(|entity| entity.to_change(self.update_type))
            .map(ChangeRecord::Entity)
            .collect();
        let links: Vec<ChangeRecord> = self
            .links
            .iter()
            .map(|entry| ChangeRecord::Link(entry.value().to_change(entry.key())))
            .collect();
        changes.extend(links.into_iter().map(|link| self.readdress(link)));
        changes.sort_by_key(|change| change.sequence());
        changes
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.links.is_empty()
            || self
                .entities
                .iter()
                .any(|entity| entity.to_change(self.update_type).is_some())
    }

    /// Identity the service addresses `id` by: the key it assigned on create,
    /// if any, otherwise the tracked identity.
    pub fn service_id(&self, id: &EntityId) -> EntityId {
        let id = self.resolve(id);
        if !id.is_transient() {
            return id;
        }
        match self.entities.get(&id) {
            Some(entity) => entity.service_id(),
            None => id,
        }
    }

    /// Rewrite the entities a change refers to with their current service identity.
    ///
    /// A change snapshotted before its entities were created carries their
    /// transient handles; once those creates commit, later requests must use the
    /// assigned keys.
    pub fn readdress(&self, change: ChangeRecord) -> ChangeRecord {
        match change {
            ChangeRecord::Entity(mut entity) => {
                entity.id = self.service_id(&entity.id);
                ChangeRecord::Entity(entity)
            }
            ChangeRecord::Link(mut link) => {
                link.source = self.service_id(&link.source);
                if let LinkTarget::Entity(target) = &link.target {
                    link.target = LinkTarget::Entity(self.service_id(target));
                }
                ChangeRecord::Link(link)
            }
        }
    }

    /// Take the snapshot a flush works from.
    ///
    /// Changes recorded after this point are not part of the snapshot and stay
    /// pending once the flush acknowledges what it committed.
    pub(crate) fn begin_flush(&self) -> FlushSnapshot<'_> {
        self.flush_revision
            .store(self.revision.load(Ordering::SeqCst).max(1), Ordering::SeqCst);
        let changes = self.pending_changes();
        let covered = changes.iter().map(ChangeRecord::revision).max().unwrap_or(0);
        self.flush_revision.fetch_max(covered, Ordering::SeqCst);

        FlushSnapshot {
            context: self,
            changes,
        }
    }

    /// Fold a successful commit of `change` into the context.
    ///
    /// `echo` is the entity as the service returned it, if it did; its etag and
    /// key replace the local ones.
    pub fn acknowledge(&self, change: &ChangeRecord, echo: Option<&EntityState>) {
        match change {
            ChangeRecord::Entity(change) => {
                let id = self.resolve(&change.id);
                let outcome = match self.entities.get_mut(&id) {
                    Some(mut entity) => {
                        let outcome = entity.acknowledge(change, echo);
                        if let Some(EntityState {
                            id: assigned @ EntityId::Keyed { .. },
                            ..
                        }) = echo
                        {
                            if id.is_transient() {
                                entity.assigned_key = assigned.key().cloned();
                            }
                        }
                        outcome
                    }
                    None => return,
                };

                match outcome {
                    AckOutcome::Remove => {
                        self.entities.remove(&id);
                        self.aliases.write().retain(|_, tracked| *tracked != id);
                    }
                    AckOutcome::Keep => {
                        if let Some(assigned) = echo.map(|state| &state.id) {
                            if id.is_transient() && !assigned.is_transient() {
                                self.aliases.write().insert(assigned.clone(), id.clone());
                            }
                        }
                    }
                }
                trace!(change = %ChangeRecord::Entity(change.clone()), "Acknowledged");
            }
            ChangeRecord::Link(link) => {
                let target = match &link.target {
                    LinkTarget::Entity(id) => LinkTarget::Entity(self.resolve(id)),
                    LinkTarget::Unset => LinkTarget::Unset,
                };
                let key = LinkKey {
                    source: self.resolve(&link.source),
                    navigation: link.navigation.clone(),
                    target,
                };
                self.links
                    .remove_if(&key, |_, tracked| tracked.revision == link.revision);
            }
        }
    }

    /// Mark an entity as in sync with the service, dropping it if it was deleted.
    pub fn clear(&self, id: &EntityId) {
        let id = self.resolve(id);
        let outcome = match self.entities.get_mut(&id) {
            Some(mut entity) => entity.reset_clean(),
            None => return,
        };
        if outcome == AckOutcome::Remove {
            self.entities.remove(&id);
        }
    }

    /// Mark everything as committed.
    pub fn clear_all(&self) {
        self.entities
            .retain(|_, entity| entity.reset_clean() == AckOutcome::Keep);
        self.links.clear();
    }

    /// Forget an entity and every pending link mutation involving it.
    pub fn detach(&self, id: &EntityId) -> bool {
        let id = self.resolve(id);
        self.links.retain(|key, _| !key.involves(&id));
        self.aliases.write().retain(|_, tracked| *tracked != id);
        self.entities.remove(&id).is_some()
    }

    /// Drop all tracked state.
    pub fn reset(&self) {
        self.entities.clear();
        self.links.clear();
        self.aliases.write().clear();
    }

    pub fn status(&self, id: &EntityId) -> Option<EntityStatus> {
        let id = self.resolve(id);
        self.entities.get(&id).map(|entity| entity.status)
    }

    pub fn is_tracked(&self, id: &EntityId) -> bool {
        self.entities.contains_key(&self.resolve(id))
    }

    /// Last known state of a tracked entity.
    pub fn entity(&self, id: &EntityId) -> Option<EntityState> {
        let id = self.resolve(id);
        self.entities.get(&id).map(|entity| entity.snapshot())
    }

    /// Service key of an entity: its own, or the one assigned when it was created.
    pub fn key_of(&self, id: &EntityId) -> Option<EntityKey> {
        let id = self.resolve(id);
        match id.key() {
            Some(key) => Some(key.clone()),
            None => self
                .entities
                .get(&id)
                .and_then(|entity| entity.assigned_key.clone()),
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.entities.len()
    }
}

/// Pending changes handed to one flush.
pub(crate) struct FlushSnapshot<'a> {
    context: &'a Context,
    pub changes: Vec<ChangeRecord>,
}

impl Drop for FlushSnapshot<'_> {
    fn drop(&mut self) {
        self.context.flush_revision.store(0, Ordering::SeqCst);
    }
}
