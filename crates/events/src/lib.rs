//! Event channels for operation progress
//!
//! This crate provides the channel-keyed event bus the backend publishes
//! step updates on, the subscription handles used to consume them, and the
//! emitter the backend uses to produce them.

mod bus;
mod emitter;
mod report;
mod types;

pub use bus::{EventBus, Subscription, DEFAULT_CAPACITY};
pub use emitter::OperationEmitter;
pub use report::format_error_report;
pub use types::EventEnvelope;
