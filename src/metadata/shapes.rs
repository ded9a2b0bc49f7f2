//! Shape descriptors handed out by the metadata collaborator.

use crate::types::ContainerInterface;
use serde::{Deserialize, Serialize};

/// An entity set exposed by a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySetShape {
    pub name: String,
    /// Qualified name of the entity type
    pub entity_type: String,
}

impl EntitySetShape {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// Functions are side-effect free, actions are not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Function,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterShape {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
}

impl ParameterShape {
    pub fn required(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: false,
        }
    }

    pub fn optional(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: true,
        }
    }
}

/// A function or action import exposed by a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationImportShape {
    pub name: String,
    pub kind: OperationKind,
    #[serde(default)]
    pub parameters: Vec<ParameterShape>,
    /// Qualified return type, `None` for operations returning nothing
    #[serde(default)]
    pub return_type: Option<String>,
}

impl OperationImportShape {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Function,
            parameters: Vec::new(),
            return_type: None,
        }
    }

    pub fn action(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Action,
            parameters: Vec::new(),
            return_type: None,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterShape) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn returning(mut self, type_name: impl Into<String>) -> Self {
        self.return_type = Some(type_name.into());
        self
    }
}

/// An entity container: its entity sets and operation imports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerShape {
    pub interface: ContainerInterface,
    #[serde(default)]
    pub entity_sets: Vec<EntitySetShape>,
    #[serde(default)]
    pub operation_imports: Vec<OperationImportShape>,
}

impl ContainerShape {
    pub fn new(interface: ContainerInterface) -> Self {
        Self {
            interface,
            entity_sets: Vec::new(),
            operation_imports: Vec::new(),
        }
    }

    pub fn with_entity_set(mut self, entity_set: EntitySetShape) -> Self {
        self.entity_sets.push(entity_set);
        self
    }

    pub fn with_operation_import(mut self, operation: OperationImportShape) -> Self {
        self.operation_imports.push(operation);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexTypeShape {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTypeShape {
    pub name: String,
    #[serde(default)]
    pub members: Vec<(String, i64)>,
    #[serde(default)]
    pub is_flags: bool,
}

/// Vocabulary term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermShape {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub applies_to: Vec<String>,
}
