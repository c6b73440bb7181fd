//! RAII guard for the channel subscription of a run.
//!
//! The subscription is released once, either explicitly when the backend
//! command settles or by `Drop` when the run is abandoned mid-flight.

use events::{EventEnvelope, Subscription};
use tracing::{debug, warn};
use uuid::Uuid;

/// Owns the subscription a run reads its step updates from.
///
/// # Example
///
/// ```ignore
/// let mut guard = RunGuard::new(run_id, &operation.id, bus.subscribe(&channel));
/// // ... read updates while the command runs ...
/// guard.release(); // on settlement
/// // If never released, Drop unsubscribes and logs the abandonment
/// ```
pub struct RunGuard {
    run_id: Uuid,
    operation_id: String,
    subscription: Subscription,
    released: bool,
}

impl RunGuard {
    pub fn new(run_id: Uuid, operation_id: impl Into<String>, subscription: Subscription) -> Self {
        let operation_id = operation_id.into();
        debug!(
            run_id = %run_id,
            operation = %operation_id,
            channel = %subscription.channel(),
            "Run guard created"
        );

        Self {
            run_id,
            operation_id,
            subscription,
            released: false,
        }
    }

    /// Wait for the next update. Returns `None` once released.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.subscription.recv().await
    }

    /// Next update already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        self.subscription.try_recv()
    }

    /// Unsubscribe after the command settled. Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.subscription.unsubscribe();
        self.released = true;
        debug!(
            run_id = %self.run_id,
            operation = %self.operation_id,
            "Run subscription released"
        );
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                run_id = %self.run_id,
                operation = %self.operation_id,
                "Run dropped before the command settled - releasing subscription"
            );
            self.release();
        }
    }
}
