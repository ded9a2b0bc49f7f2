//! Core identity and state types shared by the context, dispatcher and persistence layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Property bag of an entity, keyed by property name.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Opaque entity key as the protocol addresses it (`9`, `Id=1,Code='A'`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        EntityKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(key: &str) -> Self {
        EntityKey::new(key)
    }
}

impl From<String> for EntityKey {
    fn from(key: String) -> Self {
        EntityKey(key)
    }
}

impl From<i64> for EntityKey {
    fn from(key: i64) -> Self {
        EntityKey(key.to_string())
    }
}

/// Identity of a tracked entity.
///
/// Entities read from the service, or created with a caller-supplied key, are
/// `Keyed`. Entities created without a key get a process-unique `Transient`
/// handle until the service assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    Keyed { entity_set: String, key: EntityKey },
    Transient { entity_set: String, handle: u64 },
}

impl EntityId {
    pub fn keyed(entity_set: impl Into<String>, key: impl Into<EntityKey>) -> Self {
        EntityId::Keyed {
            entity_set: entity_set.into(),
            key: key.into(),
        }
    }

    /// Allocate a fresh transient identity in `entity_set`.
    pub fn transient(entity_set: impl Into<String>) -> Self {
        static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);
        EntityId::Transient {
            entity_set: entity_set.into(),
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn entity_set(&self) -> &str {
        match self {
            EntityId::Keyed { entity_set, .. } => entity_set,
            EntityId::Transient { entity_set, .. } => entity_set,
        }
    }

    pub fn key(&self) -> Option<&EntityKey> {
        match self {
            EntityId::Keyed { key, .. } => Some(key),
            EntityId::Transient { .. } => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EntityId::Transient { .. })
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Keyed { entity_set, key } => write!(f, "{}({})", entity_set, key),
            EntityId::Transient { entity_set, handle } => write!(f, "{}(#{})", entity_set, handle),
        }
    }
}

/// Tracking status of an entity in the unit of work.
///
/// ```text
/// New ──commit──> AttachedUnchanged <──commit── AttachedDirty
///                        │                            ▲
///                        └─────────mutation───────────┘
/// any non-deleted ──delete──> Deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityStatus {
    AttachedUnchanged,
    AttachedDirty,
    New,
    Deleted,
}

impl EntityStatus {
    /// Whether an entity in this status has something to send.
    pub fn is_pending(&self) -> bool {
        !matches!(self, EntityStatus::AttachedUnchanged)
    }

    pub fn is_attached(&self) -> bool {
        matches!(
            self,
            EntityStatus::AttachedUnchanged | EntityStatus::AttachedDirty
        )
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityStatus::AttachedUnchanged => write!(f, "attached-unchanged"),
            EntityStatus::AttachedDirty => write!(f, "attached-dirty"),
            EntityStatus::New => write!(f, "new"),
            EntityStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Kind of a navigation link mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    Add,
    Remove,
    Replace,
}

impl LinkKind {
    /// `Add` and `Remove` of the same link annihilate each other.
    pub fn cancels(&self, next: LinkKind) -> bool {
        matches!(
            (self, next),
            (LinkKind::Add, LinkKind::Remove) | (LinkKind::Remove, LinkKind::Add)
        )
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Add => write!(f, "add"),
            LinkKind::Remove => write!(f, "remove"),
            LinkKind::Replace => write!(f, "replace"),
        }
    }
}

/// Target of a navigation link mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkTarget {
    Entity(EntityId),
    /// Removal marker for single-valued navigation properties.
    Unset,
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkTarget::Entity(id) => write!(f, "{}", id),
            LinkTarget::Unset => write!(f, "<unset>"),
        }
    }
}

/// Observed state of one entity: identity, properties and concurrency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: EntityId,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub etag: Option<String>,
}

impl EntityState {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            properties: PropertyMap::new(),
            etag: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// Identity of a container-shaped interface (its qualified name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerInterface(String);

impl ContainerInterface {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        ContainerInterface(qualified_name.into())
    }

    pub fn of<T: ContainerType>() -> Self {
        ContainerInterface::new(T::QUALIFIED_NAME)
    }

    pub fn qualified_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Implemented by generated marker types standing for an entity container interface.
pub trait ContainerType: 'static {
    const QUALIFIED_NAME: &'static str;
}
