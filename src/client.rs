//! Protocol Client Abstraction
//!
//! Request building, payload encoding, URI composition and HTTP transport live
//! behind [`ProtocolClient`]. The proxy layer describes each operation with an
//! [`OperationDescriptor`] and hands it over, singly or as an atomic batch.

use crate::error::TransportError;
use crate::metadata::OperationKind;
use crate::types::{EntityId, EntityState, LinkKind, LinkTarget, PropertyMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an update carries the entity state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    /// Merge the changed properties into the stored entity
    #[default]
    Patch,
    /// Overwrite the stored entity with the full last-known state
    Replace,
}

impl UpdateType {
    pub fn method(&self) -> &'static str {
        match self {
            UpdateType::Patch => "PATCH",
            UpdateType::Replace => "PUT",
        }
    }
}

/// One protocol operation, independent of its wire form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationDescriptor {
    ReadEntitySet {
        entity_set: String,
    },
    ReadEntity {
        id: EntityId,
    },
    CreateEntity {
        id: EntityId,
        properties: PropertyMap,
    },
    UpdateEntity {
        id: EntityId,
        properties: PropertyMap,
        etag: Option<String>,
        update_type: UpdateType,
    },
    DeleteEntity {
        id: EntityId,
        etag: Option<String>,
    },
    UpdateLink {
        source: EntityId,
        navigation: String,
        target: LinkTarget,
        kind: LinkKind,
    },
    InvokeOperation {
        name: String,
        kind: OperationKind,
        parameters: PropertyMap,
    },
}

impl OperationDescriptor {
    /// Whether the operation changes state on the service
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            OperationDescriptor::ReadEntitySet { .. }
                | OperationDescriptor::ReadEntity { .. }
                | OperationDescriptor::InvokeOperation {
                    kind: OperationKind::Function,
                    ..
                }
        )
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationDescriptor::ReadEntitySet { entity_set } => write!(f, "GET {}", entity_set),
            OperationDescriptor::ReadEntity { id } => write!(f, "GET {}", id),
            OperationDescriptor::CreateEntity { id, .. } => write!(f, "POST {}", id),
            OperationDescriptor::UpdateEntity {
                id, update_type, ..
            } => write!(f, "{} {}", update_type.method(), id),
            OperationDescriptor::DeleteEntity { id, .. } => write!(f, "DELETE {}", id),
            OperationDescriptor::UpdateLink {
                source,
                navigation,
                kind,
                ..
            } => write!(f, "{} {}/{}/$ref", kind, source, navigation),
            OperationDescriptor::InvokeOperation { name, .. } => write!(f, "INVOKE {}", name),
        }
    }
}

/// What a single operation returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationResult {
    Empty,
    Entity(EntityState),
    Entities(Vec<EntityState>),
    Value(serde_json::Value),
}

impl OperationResult {
    pub fn entity(&self) -> Option<&EntityState> {
        match self {
            OperationResult::Entity(state) => Some(state),
            _ => None,
        }
    }
}

/// Result of an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every operation applied; one result per operation, in order
    Committed(Vec<OperationResult>),
    /// Nothing applied; failures by operation index
    RolledBack { failures: Vec<(usize, TransportError)> },
}

/// Protocol client trait
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Build and execute one request
    async fn execute(&self, operation: OperationDescriptor)
        -> Result<OperationResult, TransportError>;

    /// Build and execute an ordered list of operations as one all-or-nothing change set
    async fn execute_batch(
        &self,
        operations: Vec<OperationDescriptor>,
    ) -> Result<BatchOutcome, TransportError>;
}
