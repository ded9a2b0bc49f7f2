//! Service entry point.
//!
//! One [`Service`] per logical connection: it owns the unit-of-work
//! [`Context`], the cache of materialized entity containers and the lazily built
//! persistence manager, and hands out the shared protocol client.

use crate::client::{ProtocolClient, UpdateType};
use crate::config::ServiceConfig;
use crate::container::EntityContainer;
use crate::context::Context;
use crate::error::ProxyError;
use crate::metadata::{ComplexTypeShape, EnumTypeShape, MetadataResolver, TermShape};
use crate::persistence::{
    FlushReport, NonTransactionalPersistenceManager, PersistenceManager,
    TransactionalPersistenceManager,
};
use crate::types::{ContainerInterface, ContainerType};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, info};

/// State shared between a service and every container it materialized
pub(crate) struct ServiceCore {
    pub client: Arc<dyn ProtocolClient>,
    pub metadata: Arc<dyn MetadataResolver>,
    pub context: Arc<Context>,
}

/// Process-wide root of the proxy layer
pub struct Service {
    core: Arc<ServiceCore>,
    transactional: bool,
    service_root: Option<String>,
    containers: DashMap<ContainerInterface, Arc<EntityContainer>>,
    persistence_manager: OnceCell<Arc<dyn PersistenceManager>>,
}

impl Service {
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        metadata: Arc<dyn MetadataResolver>,
        transactional: bool,
    ) -> Self {
        Self::build(client, metadata, transactional, UpdateType::default())
    }

    fn build(
        client: Arc<dyn ProtocolClient>,
        metadata: Arc<dyn MetadataResolver>,
        transactional: bool,
        update_type: UpdateType,
    ) -> Self {
        Self {
            core: Arc::new(ServiceCore {
                client,
                metadata,
                context: Arc::new(Context::with_update_type(update_type)),
            }),
            transactional,
            service_root: None,
            containers: DashMap::new(),
            persistence_manager: OnceCell::new(),
        }
    }

    /// Build a service with the commit strategy the configuration selects.
    pub fn from_config(
        config: &ServiceConfig,
        client: Arc<dyn ProtocolClient>,
        metadata: Arc<dyn MetadataResolver>,
    ) -> Self {
        let mut service = Self::build(client, metadata, config.transactional, config.update_type);
        service.service_root = config.service_root.clone();
        info!(
            service_root = config.service_root.as_deref().unwrap_or("<unset>"),
            transactional = config.transactional,
            update_type = config.update_type.method(),
            "Service created"
        );
        service
    }

    /// Cached container for `interface`, materialized on first request.
    ///
    /// Concurrent first requests for the same interface construct exactly one
    /// container; the shard entry lock is held until it is stored.
    pub fn entity_container(
        &self,
        interface: &ContainerInterface,
    ) -> Result<Arc<EntityContainer>, ProxyError> {
        if let Some(container) = self.containers.get(interface) {
            return Ok(Arc::clone(container.value()));
        }

        match self.containers.entry(interface.clone()) {
            Entry::Occupied(occupied) => Ok(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                let shape = self
                    .core
                    .metadata
                    .container(interface)
                    .ok_or_else(|| ProxyError::InvalidContainerShape(interface.to_string()))?;
                let container = Arc::new(EntityContainer::new(shape, Arc::clone(&self.core))?);
                debug!(container = %interface, "Materialized entity container");
                vacant.insert(Arc::clone(&container));
                Ok(container)
            }
        }
    }

    /// Typed form of [`Service::entity_container`] for generated marker types.
    pub fn container<T: ContainerType>(&self) -> Result<Arc<EntityContainer>, ProxyError> {
        self.entity_container(&ContainerInterface::of::<T>())
    }

    /// The persistence manager, built on first use.
    pub fn persistence_manager(&self) -> Arc<dyn PersistenceManager> {
        let manager = self.persistence_manager.get_or_init(|| {
            debug!(transactional = self.transactional, "Building persistence manager");
            let context = Arc::clone(&self.core.context);
            let client = Arc::clone(&self.core.client);
            let manager: Arc<dyn PersistenceManager> = if self.transactional {
                Arc::new(TransactionalPersistenceManager::new(context, client))
            } else {
                Arc::new(NonTransactionalPersistenceManager::new(context, client))
            };
            manager
        });
        Arc::clone(manager)
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.core.context
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    pub fn update_type(&self) -> UpdateType {
        self.core.context.update_type()
    }

    pub fn client(&self) -> &Arc<dyn ProtocolClient> {
        &self.core.client
    }

    pub fn service_root(&self) -> Option<&str> {
        self.service_root.as_deref()
    }

    /// Number of containers materialized so far
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn complex_type(&self, name: &str) -> Result<ComplexTypeShape, ProxyError> {
        self.core
            .metadata
            .complex_type(name)
            .ok_or_else(|| ProxyError::UnknownTypeName(name.to_string()))
    }

    pub fn enum_type(&self, name: &str) -> Result<EnumTypeShape, ProxyError> {
        self.core
            .metadata
            .enum_type(name)
            .ok_or_else(|| ProxyError::UnknownTypeName(name.to_string()))
    }

    pub fn term(&self, name: &str) -> Result<TermShape, ProxyError> {
        self.core
            .metadata
            .term(name)
            .ok_or_else(|| ProxyError::UnknownTypeName(name.to_string()))
    }

    /// Commit pending changes through the persistence manager.
    pub async fn flush(&self) -> Result<FlushReport, ProxyError> {
        self.persistence_manager().flush().await
    }
}
