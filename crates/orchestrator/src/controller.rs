//! Runs an operation on the backend and tracks its step progress.
//!
//! A run goes through these stages in order:
//! 1. publish an empty [`ProgressState`] to the caller
//! 2. subscribe to the operation's channel
//! 3. invoke the backend command
//! 4. fold every update that arrives into the state and republish it
//! 5. once the command settles, fold what is still queued, unsubscribe and
//!    resolve or reject with the command's own outcome
//!
//! The subscription exists before the command is invoked, so updates a fast
//! backend emits immediately are not lost.

use std::sync::Arc;

use events::{EventBus, EventEnvelope};
use opwatch_core::{OperationDescriptor, OperationParams, OperationUpdate, ProgressState};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::CommandExecutor;
use crate::config::ControllerConfig;
use crate::error::{OrchestratorError, Result};
use crate::resources::RunGuard;

/// Starts operations against a backend and reports their progress.
#[derive(Clone)]
pub struct OperationController {
    bus: EventBus,
    executor: Arc<dyn CommandExecutor>,
    config: ControllerConfig,
}

impl OperationController {
    pub fn new(bus: EventBus, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            bus,
            executor,
            config: ControllerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Start a run of `operation` on a background task.
    ///
    /// The returned handle receives a fresh state immediately and after every
    /// update. Must be called from within a tokio runtime.
    pub fn start(
        &self,
        operation: OperationDescriptor,
        params: OperationParams,
    ) -> Result<OperationRun> {
        operation.validate()?;

        let run_id = Uuid::new_v4();
        let operation_id = operation.id.clone();

        let (progress_tx, progress_rx) = watch::channel(ProgressState::new(operation.clone()));

        let subscription = self.bus.subscribe(&operation.channel_name());
        let guard = RunGuard::new(run_id, &operation.id, subscription);

        let params = self.config.merge_params(params);
        let executor = Arc::clone(&self.executor);
        let task = tokio::spawn(drive(operation, params, executor, guard, progress_tx));

        Ok(OperationRun {
            run_id,
            operation_id,
            progress: progress_rx,
            task,
        })
    }

    /// Run `operation` to completion and return its final state.
    pub async fn run(
        &self,
        operation: OperationDescriptor,
        params: OperationParams,
    ) -> Result<ProgressState> {
        self.start(operation, params)?.wait().await
    }
}

impl std::fmt::Debug for OperationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationController")
            .field("bus", &self.bus)
            .field("config", &self.config)
            .finish()
    }
}

/// Handle to a run in flight.
pub struct OperationRun {
    run_id: Uuid,
    operation_id: String,
    progress: watch::Receiver<ProgressState>,
    task: JoinHandle<Result<ProgressState>>,
}

impl OperationRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// A receiver that is notified on every state change.
    ///
    /// It keeps the last state after the run ends, including when the
    /// command rejected.
    pub fn progress(&self) -> watch::Receiver<ProgressState> {
        self.progress.clone()
    }

    /// The most recently published state.
    pub fn latest(&self) -> ProgressState {
        self.progress.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop tracking the run. The subscription is released; the backend
    /// command future is dropped.
    pub fn abandon(&self) {
        info!(run_id = %self.run_id, operation = %self.operation_id, "Abandoning run");
        self.task.abort();
    }

    /// Wait for the command to settle.
    ///
    /// Resolves with the final state when the command succeeded, even if
    /// steps failed. Rejects with the command's error otherwise; the final
    /// state is still available from [`OperationRun::progress`].
    pub async fn wait(self) -> Result<ProgressState> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(OrchestratorError::Aborted {
                operation: self.operation_id,
            }),
            Err(e) => Err(OrchestratorError::ExecutionFailed(format!(
                "run of {} panicked: {}",
                self.operation_id, e
            ))),
        }
    }
}

impl std::fmt::Debug for OperationRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRun")
            .field("run_id", &self.run_id)
            .field("operation_id", &self.operation_id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

async fn drive(
    operation: OperationDescriptor,
    params: OperationParams,
    executor: Arc<dyn CommandExecutor>,
    mut guard: RunGuard,
    progress: watch::Sender<ProgressState>,
) -> Result<ProgressState> {
    let run_id = guard.run_id();
    let command = operation.command_name();
    info!(
        run_id = %run_id,
        operation = %operation.id,
        command = %command,
        steps = operation.steps.len(),
        "Operation started"
    );

    let mut state = ProgressState::new(operation);
    let mut channel_open = true;
    let outcome = {
        let invocation = executor.execute(&command, params);
        tokio::pin!(invocation);

        loop {
            tokio::select! {
                biased;

                envelope = guard.recv(), if channel_open => match envelope {
                    Some(envelope) => {
                        if let Some(next) = fold_envelope(run_id, &state, &envelope) {
                            state = next;
                            progress.send_replace(state.clone());
                        }
                    }
                    None => channel_open = false,
                },

                result = &mut invocation => break result,
            }
        }
    };

    while let Some(envelope) = guard.try_recv() {
        if let Some(next) = fold_envelope(run_id, &state, &envelope) {
            state = next;
            progress.send_replace(state.clone());
        }
    }
    guard.release();

    let verdict = state.verdict();
    match outcome {
        Ok(()) => {
            info!(
                run_id = %run_id,
                operation = %state.operation.id,
                done = verdict.done,
                succeeded = verdict.succeeded,
                failed_steps = state.failed.len(),
                "Operation command settled"
            );
            Ok(state)
        }
        Err(source) => {
            warn!(
                run_id = %run_id,
                operation = %state.operation.id,
                command = %command,
                error = %source,
                done = verdict.done,
                "Operation command rejected"
            );
            Err(OrchestratorError::command_failed(command, source))
        }
    }
}

/// Decode one envelope and fold it into `state`.
///
/// Returns `None` when the envelope leaves the state unchanged.
fn fold_envelope(
    run_id: Uuid,
    state: &ProgressState,
    envelope: &EventEnvelope,
) -> Option<ProgressState> {
    let update: OperationUpdate = match envelope.decode() {
        Ok(update) => update,
        Err(e) => {
            warn!(
                run_id = %run_id,
                channel = %envelope.channel,
                error = %e,
                "Dropping malformed operation update"
            );
            return None;
        }
    };

    match &update {
        OperationUpdate::Unknown => {
            debug!(run_id = %run_id, payload = %envelope.payload, "Ignoring unknown operation update");
            return None;
        }
        OperationUpdate::Failed { step_id, .. } if state.is_completed(step_id) => {
            warn!(
                run_id = %run_id,
                step_id = %step_id,
                "Step reported failed after it finished"
            );
        }
        _ => {}
    }

    if let Some(step_id) = update.step_id() {
        if state.operation.step(step_id).is_none() {
            debug!(run_id = %run_id, step_id = %step_id, "Update for undeclared step");
        }
        debug!(run_id = %run_id, step_id = %step_id, update = update.as_str(), "Step update");
    }

    Some(state.apply(&update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use crate::scripted::{CommandScript, ScriptedExecutor};
    use async_trait::async_trait;
    use opwatch_core::catalog::{install_sidestore, sideload};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn controller(executor: ScriptedExecutor, bus: EventBus) -> OperationController {
        OperationController::new(bus, Arc::new(executor))
    }

    #[test]
    fn test_fold_envelope_drops_malformed_payload() {
        let state = ProgressState::new(sideload());
        let envelope = EventEnvelope::new("operation_sideload", json!({ "stepId": "install" }));
        assert!(fold_envelope(Uuid::new_v4(), &state, &envelope).is_none());
    }

    #[test]
    fn test_fold_envelope_ignores_unknown_type() {
        let state = ProgressState::new(sideload());
        let envelope = EventEnvelope::new(
            "operation_sideload",
            json!({ "updateType": "progress", "stepId": "install", "percent": 50 }),
        );
        assert!(fold_envelope(Uuid::new_v4(), &state, &envelope).is_none());
    }

    #[test]
    fn test_fold_envelope_applies_update() {
        let state = ProgressState::new(sideload());
        let envelope = EventEnvelope::new(
            "operation_sideload",
            json!({ "updateType": "started", "stepId": "install" }),
        );
        let next = fold_envelope(Uuid::new_v4(), &state, &envelope).unwrap();
        assert!(next.has_started("install"));
        assert!(!state.has_started("install"));
    }

    #[tokio::test]
    async fn test_invalid_operation_is_rejected_before_invoking() {
        let bus = EventBus::new();
        let executor = ScriptedExecutor::new(bus.clone());
        let controller = controller(executor.clone(), bus.clone());

        let result = controller.start(OperationDescriptor::new("empty", "Nothing"), OperationParams::new());
        assert!(matches!(result, Err(OrchestratorError::Core(_))));
        assert!(executor.invocations().is_empty());
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_initial_state_is_published_immediately() {
        let bus = EventBus::new();
        let operation = install_sidestore();
        let executor = ScriptedExecutor::new(bus.clone()).with_operation_script(
            &operation,
            CommandScript::all_succeed(&operation).with_delay(Duration::from_millis(10)),
        );
        let run = controller(executor, bus)
            .start(operation.clone(), OperationParams::new())
            .unwrap();

        let initial = run.latest();
        assert_eq!(initial.operation, operation);
        assert!(initial.started.is_empty());
        run.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_params_are_merged_with_defaults() {
        let bus = EventBus::new();
        let operation = install_sidestore();
        let executor = ScriptedExecutor::new(bus.clone())
            .with_operation_script(&operation, CommandScript::all_succeed(&operation));

        let mut params = OperationParams::new();
        params.insert("nightly".to_string(), json!(true));
        controller(executor.clone(), bus)
            .run(operation, params)
            .await
            .unwrap();

        let invocations = executor.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].command, "install_sidestore_operation");
        assert_eq!(invocations[0].params.get("nightly"), Some(&json!(true)));
        assert_eq!(
            invocations[0].params.get("anisetteServer"),
            Some(&json!(crate::config::DEFAULT_ANISETTE_SERVER))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_is_followed_to_the_end() {
        let bus = EventBus::new();
        let operation = install_sidestore();
        let executor = ScriptedExecutor::new(bus.clone()).with_operation_script(
            &operation,
            CommandScript::all_succeed(&operation).with_delay(Duration::from_secs(30)),
        );

        let run = controller(executor, bus)
            .start(operation, OperationParams::new())
            .unwrap();
        let mut rx = run.progress();

        rx.wait_for(|state| state.has_started("install")).await.unwrap();
        assert!(!run.latest().verdict().done);

        let state = run.wait().await.unwrap();
        assert_eq!(state.completed, vec!["download", "install", "pairing"]);
    }

    #[tokio::test]
    async fn test_subscription_released_on_success_and_failure() {
        let bus = EventBus::new();
        let operation = sideload();
        let ok = ScriptedExecutor::new(bus.clone())
            .with_operation_script(&operation, CommandScript::all_succeed(&operation));
        controller(ok, bus.clone())
            .run(operation.clone(), OperationParams::new())
            .await
            .unwrap();
        assert_eq!(bus.subscriber_count("operation_sideload"), 0);

        let failing = ScriptedExecutor::new(bus.clone())
            .with_operation_script(&operation, CommandScript::new().failing_with("boom"));
        let result = controller(failing, bus.clone())
            .run(operation, OperationParams::new())
            .await;
        assert!(result.is_err());
        assert_eq!(bus.subscriber_count("operation_sideload"), 0);
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_updates_after_settlement_are_not_observed() {
        let bus = EventBus::new();
        let operation = sideload();
        let executor = ScriptedExecutor::new(bus.clone())
            .with_operation_script(&operation, CommandScript::new());

        let run = controller(executor, bus.clone())
            .start(operation, OperationParams::new())
            .unwrap();
        let rx = run.progress();
        let final_state = run.wait().await.unwrap();

        let emitter = events::OperationEmitter::new(bus, "sideload");
        assert_eq!(emitter.start("install"), 0);
        assert!(final_state.started.is_empty());
        assert!(rx.borrow().started.is_empty());
    }

    struct StallingExecutor {
        bus: EventBus,
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl CommandExecutor for StallingExecutor {
        async fn execute(
            &self,
            _command: &str,
            _params: OperationParams,
        ) -> std::result::Result<(), CommandError> {
            events::OperationEmitter::new(self.bus.clone(), "sideload").start("install");
            self.entered.notify_one();
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_abandon_releases_subscription() {
        let bus = EventBus::new();
        let entered = Arc::new(Notify::new());
        let executor = StallingExecutor {
            bus: bus.clone(),
            entered: entered.clone(),
        };
        let run = OperationController::new(bus.clone(), Arc::new(executor))
            .start(sideload(), OperationParams::new())
            .unwrap();
        let mut rx = run.progress();

        entered.notified().await;
        rx.wait_for(|state| state.has_started("install")).await.unwrap();
        assert_eq!(bus.subscriber_count("operation_sideload"), 1);

        run.abandon();
        let result = run.wait().await;
        assert!(matches!(result, Err(OrchestratorError::Aborted { .. })));
        assert_eq!(bus.subscriber_count("operation_sideload"), 0);
    }
}
