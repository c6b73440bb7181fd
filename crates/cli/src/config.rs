use std::path::{Path, PathBuf};

use opwatch_core::{OperationCatalog, OperationDescriptor};
use orchestrator::ControllerConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "opwatch.toml";
const CONFIG_DIR: &str = "opwatch";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub controller: ControllerConfig,
    /// Operations offered in addition to the built-in ones.
    pub operations: Vec<OperationDescriptor>,
}

impl AppConfig {
    /// Load the configuration, falling back to defaults.
    ///
    /// An explicit path is used as is. Otherwise `opwatch.toml` in the
    /// working directory is tried first, then the user config directory.
    pub async fn load(explicit: Option<&Path>) -> Self {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_locations().into_iter().find(|p| p.exists()),
        };

        let Some(path) = path else {
            tracing::debug!("No config file found, using defaults");
            return Self::default();
        };

        match Self::read(&path).await {
            Ok(config) => {
                tracing::debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Ignoring config {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    async fn read(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content)?;
        config.controller.validate()?;
        Ok(config)
    }

    /// Built-in operations plus the configured ones.
    pub fn catalog(&self) -> opwatch_core::Result<OperationCatalog> {
        OperationCatalog::builtin().with_additional(self.operations.clone())
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(CONFIG_DIR).join(CONFIG_FILE));
    }
    locations
}
