//! Operation catalog, step progress tracking and display projection.
//!
//! This crate is pure data and pure functions. Subscribing to the backend's
//! update channel and invoking commands lives in `orchestrator`.

pub mod catalog;
pub mod domain;
pub mod error;
pub mod projection;

pub use catalog::OperationCatalog;
pub use domain::*;
pub use error::{CoreError, Result};
pub use projection::{
    error_report, project, project_step, short_error_summary, OperationView, RunStatus,
    StepView, StepVisual,
};
