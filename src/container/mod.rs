//! Entity container dispatcher.
//!
//! A container's members are resolved once, when the container is
//! materialized, into a method table mapping member names to what they stand
//! for. Calls are dispatched by looking the name up in that table.

mod entity_set;
mod handle;

pub use entity_set::EntitySet;
pub use handle::EntityHandle;

use crate::client::{OperationDescriptor, OperationResult};
use crate::error::ProxyError;
use crate::metadata::{ContainerShape, EntitySetShape, OperationImportShape};
use crate::service::ServiceCore;
use crate::types::{ContainerInterface, PropertyMap};
use dashmap::DashMap;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a container member name resolves to
#[derive(Debug, Clone)]
pub enum ContainerMethod {
    EntitySet(EntitySetShape),
    OperationImport(OperationImportShape),
}

/// Result of a dispatched container call
#[derive(Debug)]
pub enum Invocation {
    EntitySet(Arc<EntitySet>),
    Operation(OperationResult),
}

impl Invocation {
    pub fn into_entity_set(self) -> Option<Arc<EntitySet>> {
        match self {
            Invocation::EntitySet(entity_set) => Some(entity_set),
            Invocation::Operation(_) => None,
        }
    }

    pub fn into_result(self) -> Option<OperationResult> {
        match self {
            Invocation::Operation(result) => Some(result),
            Invocation::EntitySet(_) => None,
        }
    }
}

/// Materialized entity container bound to one service
pub struct EntityContainer {
    interface: ContainerInterface,
    methods: HashMap<String, ContainerMethod>,
    entity_sets: DashMap<String, Arc<EntitySet>>,
    core: Arc<ServiceCore>,
}

impl EntityContainer {
    pub(crate) fn new(shape: ContainerShape, core: Arc<ServiceCore>) -> Result<Self, ProxyError> {
        let mut methods = HashMap::new();
        let members = shape
            .entity_sets
            .into_iter()
            .map(|set| (set.name.clone(), ContainerMethod::EntitySet(set)))
            .chain(
                shape
                    .operation_imports
                    .into_iter()
                    .map(|op| (op.name.clone(), ContainerMethod::OperationImport(op))),
            );

        for (name, method) in members {
            match methods.entry(name) {
                Entry::Occupied(occupied) => {
                    return Err(ProxyError::InvalidContainerShape(format!(
                        "{} declares '{}' more than once",
                        shape.interface,
                        occupied.key()
                    )));
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(method);
                }
            }
        }

        Ok(Self {
            interface: shape.interface,
            methods,
            entity_sets: DashMap::new(),
            core,
        })
    }

    pub fn interface(&self) -> &ContainerInterface {
        &self.interface
    }

    /// Member names, sorted
    pub fn member_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn method(&self, name: &str) -> Option<&ContainerMethod> {
        self.methods.get(name)
    }

    fn lookup(&self, name: &str) -> Result<&ContainerMethod, ProxyError> {
        self.methods
            .get(name)
            .ok_or_else(|| ProxyError::UnknownMember {
                container: self.interface.clone(),
                member: name.to_string(),
            })
    }

    /// Dispatch a call by member name.
    ///
    /// Entity-set members take no arguments and return the cached handler;
    /// operation imports execute immediately.
    pub async fn invoke(&self, method: &str, args: PropertyMap) -> Result<Invocation, ProxyError> {
        match self.lookup(method)? {
            ContainerMethod::EntitySet(shape) => {
                if !args.is_empty() {
                    return Err(ProxyError::InvalidArgument(format!(
                        "entity set '{}' takes no arguments",
                        shape.name
                    )));
                }
                Ok(Invocation::EntitySet(self.entity_set_for(shape)))
            }
            ContainerMethod::OperationImport(shape) => {
                let shape = shape.clone();
                self.execute_operation(&shape, args)
                    .await
                    .map(Invocation::Operation)
            }
        }
    }

    /// Handler for entity set `name`; repeated calls return the same handler.
    pub fn entity_set(&self, name: &str) -> Result<Arc<EntitySet>, ProxyError> {
        match self.lookup(name)? {
            ContainerMethod::EntitySet(shape) => Ok(self.entity_set_for(shape)),
            ContainerMethod::OperationImport(_) => Err(ProxyError::InvalidArgument(format!(
                "'{}' is an operation import, not an entity set",
                name
            ))),
        }
    }

    fn entity_set_for(&self, shape: &EntitySetShape) -> Arc<EntitySet> {
        let handler = self
            .entity_sets
            .entry(shape.name.clone())
            .or_insert_with(|| {
                debug!(container = %self.interface, entity_set = %shape.name, "Created entity set handler");
                Arc::new(EntitySet::new(shape.clone(), Arc::clone(&self.core)))
            });
        Arc::clone(handler.value())
    }

    /// Execute operation import `name` right away, outside the unit of work.
    pub async fn invoke_operation(
        &self,
        name: &str,
        parameters: PropertyMap,
    ) -> Result<OperationResult, ProxyError> {
        match self.lookup(name)? {
            ContainerMethod::OperationImport(shape) => {
                let shape = shape.clone();
                self.execute_operation(&shape, parameters).await
            }
            ContainerMethod::EntitySet(_) => Err(ProxyError::InvalidArgument(format!(
                "'{}' is an entity set, not an operation import",
                name
            ))),
        }
    }

    async fn execute_operation(
        &self,
        shape: &OperationImportShape,
        parameters: PropertyMap,
    ) -> Result<OperationResult, ProxyError> {
        check_parameters(shape, &parameters)?;

        let operation = OperationDescriptor::InvokeOperation {
            name: shape.name.clone(),
            kind: shape.kind,
            parameters,
        };
        debug!(container = %self.interface, operation = %shape.name, "Invoking operation import");

        let result = self
            .core
            .client
            .execute(operation)
            .await
            .map_err(|source| {
                warn!(operation = %shape.name, error = %source, "Operation import failed");
                ProxyError::OperationInvocationError {
                    operation: shape.name.clone(),
                    source,
                }
            })?;

        match &result {
            OperationResult::Entity(state) => {
                self.core.context.attach(state.clone());
            }
            OperationResult::Entities(states) => {
                for state in states {
                    self.core.context.attach(state.clone());
                }
            }
            OperationResult::Empty | OperationResult::Value(_) => {}
        }
        Ok(result)
    }
}

/// Every supplied parameter must be declared; every non-nullable one supplied.
impl std::fmt::Debug for EntityContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityContainer")
            .field("interface", &self.interface)
            .field("members", &self.member_names())
            .finish()
    }
}

fn check_parameters(shape: &OperationImportShape, parameters: &PropertyMap) -> Result<(), ProxyError> {
    if let Some(unknown) = parameters
        .keys()
        .find(|name| !shape.parameters.iter().any(|p| &p.name == *name))
    {
        return Err(ProxyError::InvalidArgument(format!(
            "'{}' has no parameter '{}'",
            shape.name, unknown
        )));
    }

    if let Some(missing) = shape
        .parameters
        .iter()
        .find(|p| !p.nullable && !parameters.contains_key(&p.name))
    {
        return Err(ProxyError::InvalidArgument(format!(
            "'{}' requires parameter '{}'",
            shape.name, missing.name
        )));
    }
    Ok(())
}
