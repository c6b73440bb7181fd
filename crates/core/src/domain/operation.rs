use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Prefix of the event channel an operation reports its steps on.
pub const CHANNEL_PREFIX: &str = "operation_";
/// Suffix of the backend command that performs an operation.
pub const COMMAND_SUFFIX: &str = "_operation";

/// Flat parameter map handed to the backend command.
pub type OperationParams = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StepDescriptor {
    pub id: String,
    pub label: String,
}

impl StepDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Static description of a multi-step operation.
///
/// Step order is display order only. The backend may report steps in any
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct OperationDescriptor {
    pub id: String,
    pub title: String,
    pub steps: Vec<StepDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
}

impl OperationDescriptor {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            steps: Vec::new(),
            success_title: None,
            success_message: None,
        }
    }

    pub fn with_step(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.steps.push(StepDescriptor::new(id, label));
        self
    }

    pub fn with_success_title(mut self, title: impl Into<String>) -> Self {
        self.success_title = Some(title.into());
        self
    }

    pub fn with_success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    /// Name of the channel the backend publishes step updates on.
    pub fn channel_name(&self) -> String {
        format!("{}{}", CHANNEL_PREFIX, self.id)
    }

    /// Name of the backend command that runs this operation.
    pub fn command_name(&self) -> String {
        format!("{}{}", self.id, COMMAND_SUFFIX)
    }

    pub fn step(&self, step_id: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Check the descriptor can be run: a non-empty id, at least one step and
    /// unique step ids.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation(
                "operation id must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(CoreError::EmptySteps(self.id.clone()));
        }

        let mut seen = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "operation {} has a step with an empty id",
                    self.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(CoreError::DuplicateStep {
                    operation: self.id.clone(),
                    step: step.id.clone(),
                });
            }
        }

        Ok(())
    }
}
