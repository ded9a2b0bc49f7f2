//! Metadata collaborator contract.
//!
//! Which containers and types exist is decided outside this crate (generated
//! code, a parsed metadata document). The proxy layer only asks for shapes by
//! name through [`MetadataResolver`].

pub mod shapes;

pub use shapes::{
    ComplexTypeShape, ContainerShape, EntitySetShape, EnumTypeShape, OperationImportShape,
    OperationKind, ParameterShape, TermShape,
};

use crate::types::ContainerInterface;
use std::collections::HashMap;

/// Resolves container and type shapes by identity or qualified name
pub trait MetadataResolver: Send + Sync {
    /// Shape of an entity container interface, `None` if the interface is not one
    fn container(&self, interface: &ContainerInterface) -> Option<ContainerShape>;

    fn complex_type(&self, name: &str) -> Option<ComplexTypeShape>;

    fn enum_type(&self, name: &str) -> Option<EnumTypeShape>;

    fn term(&self, name: &str) -> Option<TermShape>;
}

/// In-memory resolver populated by generated code at startup
#[derive(Debug, Default, Clone)]
pub struct MetadataRegistry {
    containers: HashMap<ContainerInterface, ContainerShape>,
    complex_types: HashMap<String, ComplexTypeShape>,
    enum_types: HashMap<String, EnumTypeShape>,
    terms: HashMap<String, TermShape>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_container(&mut self, shape: ContainerShape) {
        self.containers.insert(shape.interface.clone(), shape);
    }

    pub fn register_complex_type(&mut self, shape: ComplexTypeShape) {
        self.complex_types.insert(shape.name.clone(), shape);
    }

    pub fn register_enum_type(&mut self, shape: EnumTypeShape) {
        self.enum_types.insert(shape.name.clone(), shape);
    }

    pub fn register_term(&mut self, shape: TermShape) {
        self.terms.insert(shape.name.clone(), shape);
    }

    pub fn with_container(mut self, shape: ContainerShape) -> Self {
        self.register_container(shape);
        self
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }
}

impl MetadataResolver for MetadataRegistry {
    fn container(&self, interface: &ContainerInterface) -> Option<ContainerShape> {
        self.containers.get(interface).cloned()
    }

    fn complex_type(&self, name: &str) -> Option<ComplexTypeShape> {
        self.complex_types.get(name).cloned()
    }

    fn enum_type(&self, name: &str) -> Option<EnumTypeShape> {
        self.enum_types.get(name).cloned()
    }

    fn term(&self, name: &str) -> Option<TermShape> {
        self.terms.get(name).cloned()
    }
}
