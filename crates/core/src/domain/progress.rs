use serde::{Deserialize, Serialize};

use super::operation::OperationDescriptor;
use super::update::{OperationUpdate, StepFailure};

/// Accumulated step record for one run of an operation.
///
/// The three collections only ever grow. A step id may sit in more than one
/// of them (started and later failed), so callers must look at all of them
/// rather than at the latest update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub operation: OperationDescriptor,
    /// Steps that reported `started`, in arrival order, without duplicates.
    pub started: Vec<String>,
    /// Steps that reported `finished`, in arrival order, without duplicates.
    pub completed: Vec<String>,
    /// Every `failed` report in arrival order. Not deduplicated.
    pub failed: Vec<StepFailure>,
}

impl ProgressState {
    pub fn new(operation: OperationDescriptor) -> Self {
        Self {
            operation,
            started: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Fold one update into a new state, leaving `self` untouched.
    #[must_use]
    pub fn apply(&self, update: &OperationUpdate) -> Self {
        let mut next = self.clone();
        match update {
            OperationUpdate::Started { step_id } => {
                if !next.has_started(step_id) {
                    next.started.push(step_id.clone());
                }
            }
            OperationUpdate::Finished { step_id } => {
                if !next.is_completed(step_id) {
                    next.completed.push(step_id.clone());
                }
            }
            OperationUpdate::Failed {
                step_id,
                extra_details,
            } => next.failed.push(StepFailure {
                step_id: step_id.clone(),
                extra_details: extra_details.clone(),
            }),
            OperationUpdate::Unknown => {}
        }
        next
    }

    pub fn has_started(&self, step_id: &str) -> bool {
        self.started.iter().any(|s| s == step_id)
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.completed.iter().any(|s| s == step_id)
    }

    /// First recorded failure for `step_id`, if any.
    pub fn failure(&self, step_id: &str) -> Option<&StepFailure> {
        self.failed.iter().find(|f| f.step_id == step_id)
    }

    pub fn has_failed(&self, step_id: &str) -> bool {
        self.failure(step_id).is_some()
    }

    pub fn any_failed(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn verdict(&self) -> Verdict {
        is_done(self)
    }
}

/// Fold one update into `state`.
#[must_use]
pub fn reduce(state: &ProgressState, update: &OperationUpdate) -> ProgressState {
    state.apply(update)
}

/// Whether a run has finished and whether it went through cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Verdict {
    pub done: bool,
    pub succeeded: bool,
}

/// Derive the termination verdict of `state`.
///
/// A run is over when as many steps completed as the operation declares, or
/// when something failed and every started step has been answered by a
/// completion or a failure. Steps that never started are not waited for once
/// a failure has been seen.
///
/// Both checks compare counts, not step ids. Updates for undeclared steps
/// count like any other, and a step that reports twice is counted twice.
pub fn is_done(state: &ProgressState) -> Verdict {
    let any_failed = state.any_failed();
    let all_accounted_for = state.started.len() == state.completed.len() + state.failed.len();
    let fully_succeeded = state.completed.len() == state.operation.steps.len();

    let done = (any_failed && all_accounted_for) || fully_succeeded;
    Verdict {
        done,
        succeeded: done && !any_failed,
    }
}
