//! Change records drained from the context by the persistence managers.

use crate::types::{EntityId, LinkKind, LinkTarget, PropertyMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an entity change asks the service to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityChangeKind {
    Create,
    Update,
    Delete,
}

/// Pending change of one entity.
///
/// `properties` carries every known property for a create and only the changed
/// ones for an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    pub id: EntityId,
    pub kind: EntityChangeKind,
    pub properties: PropertyMap,
    pub etag: Option<String>,
    /// Order in which the entity first became pending
    pub sequence: u64,
    /// Revision of the tracked state this record was taken from
    pub revision: u64,
}

/// Pending mutation of one navigation link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkChange {
    pub source: EntityId,
    pub navigation: String,
    pub target: LinkTarget,
    pub kind: LinkKind,
    pub sequence: u64,
    pub revision: u64,
}

/// One unit of pending work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeRecord {
    Entity(EntityChange),
    Link(LinkChange),
}

impl ChangeRecord {
    pub fn sequence(&self) -> u64 {
        match self {
            ChangeRecord::Entity(change) => change.sequence,
            ChangeRecord::Link(change) => change.sequence,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            ChangeRecord::Entity(change) => change.revision,
            ChangeRecord::Link(change) => change.revision,
        }
    }

    /// Entity this change is about (the source, for link changes).
    pub fn entity_id(&self) -> &EntityId {
        match self {
            ChangeRecord::Entity(change) => &change.id,
            ChangeRecord::Link(change) => &change.source,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityChange> {
        match self {
            ChangeRecord::Entity(change) => Some(change),
            ChangeRecord::Link(_) => None,
        }
    }

    pub fn as_link(&self) -> Option<&LinkChange> {
        match self {
            ChangeRecord::Link(change) => Some(change),
            ChangeRecord::Entity(_) => None,
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeRecord::Entity(change) => {
                let verb = match change.kind {
                    EntityChangeKind::Create => "create",
                    EntityChangeKind::Update => "update",
                    EntityChangeKind::Delete => "delete",
                };
                write!(f, "{} {}", verb, change.id)
            }
            ChangeRecord::Link(change) => write!(
                f,
                "{} link {}/{} -> {}",
                change.kind, change.source, change.navigation, change.target
            ),
        }
    }
}
