use opwatch_core::OperationParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OrchestratorError, Result};

/// Anisette server used when the caller does not pick one.
pub const DEFAULT_ANISETTE_SERVER: &str = "ani.sidestore.io";

/// Settings shared by every run a controller starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Parameters sent with every command. Keys the caller passes win.
    pub default_params: OperationParams,
    /// Per-channel event buffer size.
    pub channel_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let mut default_params = OperationParams::new();
        default_params.insert(
            "anisetteServer".to_string(),
            Value::String(DEFAULT_ANISETTE_SERVER.to_string()),
        );

        Self {
            default_params,
            channel_capacity: events::DEFAULT_CAPACITY,
        }
    }
}

impl ControllerConfig {
    pub fn with_default_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_params.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(OrchestratorError::Config(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The defaults overlaid with `params`.
    pub fn merge_params(&self, params: OperationParams) -> OperationParams {
        let mut merged = self.default_params.clone();
        merged.extend(params);
        merged
    }
}
