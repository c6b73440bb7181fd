use opwatch_core::CoreError;
use thiserror::Error;

/// Failure reported by the backend for a whole command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The backend command itself rejected. Says nothing about which step,
    /// if any, failed.
    #[error("Command {command} failed: {source}")]
    Command {
        command: String,
        #[source]
        source: CommandError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Run of {operation} was abandoned before the backend settled")]
    Aborted { operation: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    /// Create a command failed error.
    pub fn command_failed(command: impl Into<String>, source: CommandError) -> Self {
        Self::Command {
            command: command.into(),
            source,
        }
    }

    /// The backend's own error, when this is an invocation-level failure.
    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            Self::Command { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
