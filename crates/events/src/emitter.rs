//! Backend-side helper for reporting step progress.

use std::error::Error;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opwatch_core::{OperationUpdate, CHANNEL_PREFIX};
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::report::format_error_report;
use crate::types::EventEnvelope;

/// Publishes step updates for one operation on its channel.
///
/// Clones share the bus and the sequence counter.
#[derive(Clone)]
pub struct OperationEmitter {
    bus: EventBus,
    channel: String,
    sequence: Arc<AtomicU64>,
}

impl OperationEmitter {
    /// Create an emitter for the operation with id `operation_id`.
    pub fn new(bus: EventBus, operation_id: &str) -> Self {
        Self {
            bus,
            channel: format!("{}{}", CHANNEL_PREFIX, operation_id),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish `update`. Returns the number of subscribers that received it.
    pub fn emit(&self, update: &OperationUpdate) -> usize {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let payload = match serde_json::to_value(update) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Failed to encode operation update");
                return 0;
            }
        };

        let delivered = self.bus.publish(EventEnvelope::new(&self.channel, payload));
        debug!(
            channel = %self.channel,
            seq,
            update = update.as_str(),
            step_id = update.step_id().unwrap_or_default(),
            delivered,
            "Operation update emitted"
        );
        delivered
    }

    pub fn start(&self, step_id: &str) -> usize {
        self.emit(&OperationUpdate::started(step_id))
    }

    pub fn finish(&self, step_id: &str) -> usize {
        self.emit(&OperationUpdate::finished(step_id))
    }

    pub fn fail(&self, step_id: &str, extra_details: impl Into<String>) -> usize {
        self.emit(&OperationUpdate::failed(step_id, extra_details))
    }

    /// Report `error` and its source chain as the failure of `step_id`.
    pub fn fail_with(&self, step_id: &str, error: &(dyn Error + 'static)) -> usize {
        self.fail(step_id, format_error_report(error))
    }

    /// Run `work` as step `step_id`: report it started, then finished or
    /// failed depending on the outcome. The outcome is handed back unchanged.
    pub async fn run_step<T, E, F>(&self, step_id: &str, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.start(step_id);
        match work.await {
            Ok(value) => {
                self.finish(step_id);
                Ok(value)
            }
            Err(e) => {
                self.fail_with(step_id, &e);
                Err(e)
            }
        }
    }

    /// Number of updates emitted so far (for debugging/testing).
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for OperationEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationEmitter")
            .field("channel", &self.channel)
            .field("sequence", &self.current_sequence())
            .finish()
    }
}
