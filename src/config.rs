//! Configuration System
//!
//! Layered configuration for embedding applications: built-in defaults, the
//! global user file, workspace files, then `ENTITY_PROXY__*` environment
//! variables. See [`ConfigLoader`] for the precedence rules.

use crate::client::UpdateType;
use crate::error::ProxyError;
use crate::logging::{LoggingConfig, FORMATS, LEVELS, OUTPUTS};
use serde::{Deserialize, Serialize};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings of one service connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root URL of the remote service, used to label logs
    #[serde(default)]
    pub service_root: Option<String>,

    /// Commit the unit of work as one atomic change set
    #[serde(default = "default_transactional")]
    pub transactional: bool,

    /// Whether updates merge changed properties or replace the whole entity
    #[serde(default)]
    pub update_type: UpdateType,
}

fn default_transactional() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_root: None,
            transactional: default_transactional(),
            update_type: UpdateType::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Service(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Service(msg) => write!(f, "Service: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(root) = &self.service_root {
            let rest = root
                .strip_prefix("https://")
                .or_else(|| root.strip_prefix("http://"));
            match rest {
                Some(host) if !host.is_empty() => {}
                _ => return Err(format!("service_root must be an http(s) URL, got '{}'", root)),
            }
        }
        Ok(())
    }
}

fn validate_logging(logging: &LoggingConfig) -> Vec<String> {
    let mut problems = Vec::new();
    if !LEVELS.contains(&logging.level.as_str()) {
        problems.push(format!("unknown level '{}'", logging.level));
    }
    if !FORMATS.contains(&logging.format.as_str()) {
        problems.push(format!("unknown format '{}'", logging.format));
    }
    if !OUTPUTS.contains(&logging.output.as_str()) {
        problems.push(format!("unknown output '{}'", logging.output));
    }
    for (module, level) in &logging.modules {
        if !LEVELS.contains(&level.as_str()) {
            problems.push(format!("unknown level '{}' for module '{}'", level, module));
        }
    }
    problems
}

impl ProxyConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.service.validate() {
            errors.push(ValidationError::Service(e));
        }
        errors.extend(
            validate_logging(&self.logging)
                .into_iter()
                .map(ValidationError::Logging),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one error.
    pub fn validated(self) -> Result<Self, ProxyError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ProxyError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Render as TOML, e.g. to seed a config file.
    pub fn to_toml(&self) -> Result<String, ProxyError> {
        toml::to_string_pretty(self)
            .map_err(|e| ProxyError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
