//! Navigation link mutations tracked by the context.

use super::change::LinkChange;
use crate::types::{EntityId, LinkKind, LinkTarget};

/// A link mutation is identified by its (source, navigation, target) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct LinkKey {
    pub source: EntityId,
    pub navigation: String,
    pub target: LinkTarget,
}

impl LinkKey {
    pub fn involves(&self, id: &EntityId) -> bool {
        self.source == *id || matches!(&self.target, LinkTarget::Entity(target) if target == id)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TrackedLink {
    pub kind: LinkKind,
    pub sequence: u64,
    pub revision: u64,
}

impl TrackedLink {
    pub fn to_change(&self, key: &LinkKey) -> LinkChange {
        LinkChange {
            source: key.source.clone(),
            navigation: key.navigation.clone(),
            target: key.target.clone(),
            kind: self.kind,
            sequence: self.sequence,
            revision: self.revision,
        }
    }
}
