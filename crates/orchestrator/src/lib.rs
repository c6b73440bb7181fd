pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod resources;
pub mod scripted;

pub use backend::CommandExecutor;
pub use config::{ControllerConfig, DEFAULT_ANISETTE_SERVER};
pub use controller::{OperationController, OperationRun};
pub use error::{CommandError, OrchestratorError, Result};
pub use resources::RunGuard;
pub use scripted::{CommandScript, Invocation, ScriptedExecutor};
