//! Entity Proxy: typed access to entity data services
//!
//! Client-side proxy layer over an entity-oriented data protocol. Callers get an
//! entity container from a [`Service`], work with its entity sets and entities
//! as a local object graph, and commit the accumulated unit of work with
//! [`Service::flush`]. Reads and operation imports go out immediately; writes
//! are tracked in the [`Context`] until a persistence manager commits them,
//! either as one atomic change set or change by change.
//!
//! Payload encoding, URI composition, transport and metadata parsing are
//! supplied by the embedding application through [`ProtocolClient`] and
//! [`MetadataResolver`].

pub mod client;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod persistence;
pub mod service;
pub mod types;

pub use client::{BatchOutcome, OperationDescriptor, OperationResult, ProtocolClient, UpdateType};
pub use container::{ContainerMethod, EntityContainer, EntityHandle, EntitySet, Invocation};
pub use context::{ChangeRecord, Context};
pub use error::{FailedChange, ProxyError, TransportError};
pub use metadata::{MetadataRegistry, MetadataResolver};
pub use persistence::{FlushReport, PersistenceManager};
pub use service::Service;
pub use types::{
    ContainerInterface, ContainerType, EntityId, EntityKey, EntityState, EntityStatus, LinkKind,
    LinkTarget, PropertyMap,
};
