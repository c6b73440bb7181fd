use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Operation already registered: {0}")]
    DuplicateOperation(String),

    #[error("Operation {0} declares no steps")]
    EmptySteps(String),

    #[error("Operation {operation} declares step {step} more than once")]
    DuplicateStep { operation: String, step: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
