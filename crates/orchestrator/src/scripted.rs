//! In-process backend that plays back canned step updates.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use events::{EventBus, OperationEmitter};
use opwatch_core::{OperationDescriptor, OperationParams, OperationUpdate, COMMAND_SUFFIX};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::CommandExecutor;
use crate::error::{CommandError, OrchestratorError, Result};

/// What a scripted command does when invoked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandScript {
    /// Updates published in order.
    pub updates: Vec<OperationUpdate>,
    /// Pause before each update, in milliseconds.
    pub delay_ms: u64,
    /// Reject the command with this message after the updates are out.
    pub error: Option<String>,
    /// Step that fails with `error` as its root cause before the command
    /// rejects. Ignored without `error`.
    pub failing_step: Option<String>,
}

/// Failure reported for the step named by [`CommandScript::failing_step`].
#[derive(Debug, Error)]
#[error("{step} failed")]
struct ScriptedStepError {
    step: String,
    #[source]
    cause: CommandError,
}

impl CommandScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every declared step starts and finishes, in declaration order.
    pub fn all_succeed(operation: &OperationDescriptor) -> Self {
        let updates = operation
            .steps
            .iter()
            .flat_map(|step| {
                [
                    OperationUpdate::started(&step.id),
                    OperationUpdate::finished(&step.id),
                ]
            })
            .collect();

        Self {
            updates,
            ..Self::default()
        }
    }

    /// Steps before `step` start and finish, then `step` fails with
    /// `message` and the command rejects with it.
    pub fn fails_at(
        operation: &OperationDescriptor,
        step: &str,
        message: impl Into<String>,
    ) -> Self {
        let mut script = Self::new();
        for earlier in operation.steps.iter().take_while(|s| s.id != step) {
            script.updates.push(OperationUpdate::started(&earlier.id));
            script.updates.push(OperationUpdate::finished(&earlier.id));
        }
        script.failing_step = Some(step.to_string());
        script.failing_with(message)
    }

    pub fn with_update(mut self, update: OperationUpdate) -> Self {
        self.updates.push(update);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Read a script from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| {
            OrchestratorError::Serialization(format!("{}: {}", path.display(), e))
        })
    }
}

/// A recorded call to [`ScriptedExecutor::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: String,
    pub params: OperationParams,
}

/// [`CommandExecutor`] that publishes scripted updates on the shared bus.
#[derive(Clone)]
pub struct ScriptedExecutor {
    bus: EventBus,
    scripts: HashMap<String, CommandScript>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedExecutor {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            scripts: HashMap::new(),
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script the command named `command`.
    pub fn with_script(mut self, command: impl Into<String>, script: CommandScript) -> Self {
        self.scripts.insert(command.into(), script);
        self
    }

    /// Script the command that runs `operation`.
    pub fn with_operation_script(self, operation: &OperationDescriptor, script: CommandScript) -> Self {
        self.with_script(operation.command_name(), script)
    }

    /// Calls received so far.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        command: &str,
        params: OperationParams,
    ) -> std::result::Result<(), CommandError> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Invocation {
                command: command.to_string(),
                params,
            });

        let script = self
            .scripts
            .get(command)
            .ok_or_else(|| CommandError::NotFound(command.to_string()))?;

        let operation_id = command.strip_suffix(COMMAND_SUFFIX).unwrap_or(command);
        let emitter = OperationEmitter::new(self.bus.clone(), operation_id);
        info!(
            command = %command,
            updates = script.updates.len(),
            "Playing scripted command"
        );

        for update in &script.updates {
            if script.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(script.delay_ms)).await;
            }
            emitter.emit(update);
        }

        let Some(message) = &script.error else {
            return Ok(());
        };

        if let Some(step) = &script.failing_step {
            if script.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(script.delay_ms)).await;
            }
            let failure = ScriptedStepError {
                step: step.clone(),
                cause: CommandError::Failed(message.clone()),
            };
            let _ = emitter
                .run_step(step, async move { Err::<(), _>(failure) })
                .await;
        }

        debug!(command = %command, error = %message, "Scripted command rejecting");
        Err(CommandError::Failed(message.clone()))
    }
}

impl std::fmt::Debug for ScriptedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedExecutor")
            .field("commands", &self.scripts.keys().collect::<Vec<_>>())
            .finish()
    }
}
