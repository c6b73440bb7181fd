//! RAII resource guards for automatic cleanup.
//!
//! - [`RunGuard`] - Channel subscription of one run, released exactly once

mod run_guard;

pub use run_guard::RunGuard;
