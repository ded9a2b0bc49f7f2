//! Config loader: assembles the layered sources into a [`ProxyConfig`].

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::ProxyConfig;
use crate::error::ProxyError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads configuration with precedence (lowest to highest):
///
/// 1. built-in defaults
/// 2. global file (`$XDG_CONFIG_HOME/entity-proxy/config.toml`)
/// 3. `<workspace>/config/config.toml`
/// 4. `<workspace>/config/{ENTITY_PROXY_ENV}.toml`
/// 5. `ENTITY_PROXY__SECTION__KEY` environment variables
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(workspace_root: &Path) -> Result<ProxyConfig, ProxyError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = merge_policy::add_environment(builder);

        let config: ProxyConfig = builder.build()?.try_deserialize()?;
        debug!(
            workspace = %workspace_root.display(),
            transactional = config.service.transactional,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load a single TOML file on top of the defaults, ignoring other sources.
    pub fn load_from_file(path: &Path) -> Result<ProxyConfig, ProxyError> {
        if !path.exists() {
            return Err(ProxyError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Load and validate.
    pub fn load_validated(workspace_root: &Path) -> Result<ProxyConfig, ProxyError> {
        Self::load(workspace_root)?.validated()
    }

    /// Where the global configuration file is looked up.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
