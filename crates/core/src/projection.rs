//! Per-step display states derived from a [`ProgressState`].
//!
//! Nothing here renders anything. Front ends map [`StepVisual`] onto icons
//! and text however they like.

use serde::Serialize;

use crate::domain::{ProgressState, StepDescriptor, Verdict};

/// Bullet the backend's diagnostic formatter puts in front of each cause.
pub const DIAGNOSTIC_BULLET: char = '●';

const NO_ERROR_DETAILS: &str = "No error details";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepVisual {
    Failed { summary: String, details: String },
    Completed,
    InProgress,
    /// Never started, and the run already failed elsewhere.
    Skipped,
    Waiting,
}

impl StepVisual {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "failed",
            Self::Completed => "completed",
            Self::InProgress => "in_progress",
            Self::Skipped => "skipped",
            Self::Waiting => "waiting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StepView {
    pub step: StepDescriptor,
    pub visual: StepVisual,
}

/// Display state of one declared step.
///
/// Failed wins over completed, completed over in progress, and only steps
/// that never started are skipped or waiting.
pub fn project_step(state: &ProgressState, step: &StepDescriptor) -> StepVisual {
    if let Some(failure) = state.failure(&step.id) {
        return StepVisual::Failed {
            summary: short_error_summary(&failure.extra_details),
            details: trim_leading_newlines(&failure.extra_details).to_string(),
        };
    }
    if state.is_completed(&step.id) {
        StepVisual::Completed
    } else if state.has_started(&step.id) {
        StepVisual::InProgress
    } else if state.any_failed() {
        StepVisual::Skipped
    } else {
        StepVisual::Waiting
    }
}

/// Display state of every declared step, in declaration order.
pub fn project(state: &ProgressState) -> Vec<StepView> {
    state
        .operation
        .steps
        .iter()
        .map(|step| StepView {
            step: step.clone(),
            visual: project_step(state, step),
        })
        .collect()
}

/// One-line summary of a failure report.
///
/// Takes the last line carrying [`DIAGNOSTIC_BULLET`] and keeps the trimmed
/// text after the bullet, even when that leaves nothing. Falls back to the
/// whole trimmed text only when no line carries a bullet.
pub fn short_error_summary(details: &str) -> String {
    details
        .lines()
        .rev()
        .find(|line| line.contains(DIAGNOSTIC_BULLET))
        .map(strip_bullet)
        .unwrap_or_else(|| details.trim().to_string())
}

fn strip_bullet(line: &str) -> String {
    match line.split_once(DIAGNOSTIC_BULLET) {
        Some((_, rest)) => rest.trim().to_string(),
        None => line.trim().to_string(),
    }
}

fn trim_leading_newlines(text: &str) -> &str {
    text.trim_start_matches(|c: char| c == '\n' || c == '\r')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn from_verdict(verdict: Verdict) -> Self {
        match (verdict.done, verdict.succeeded) {
            (false, _) => Self::Running,
            (true, true) => Self::Completed,
            (true, false) => Self::Failed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "Please wait…",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// Everything a front end needs to draw a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct OperationView {
    pub title: String,
    pub status: RunStatus,
    pub verdict: Verdict,
    pub steps: Vec<StepView>,
    /// Only set once the run succeeded.
    pub success_message: Option<String>,
    /// The view may be closed once the run is done.
    pub dismissable: bool,
}

impl OperationView {
    pub fn from_state(state: &ProgressState) -> Self {
        let verdict = state.verdict();
        let operation = &state.operation;

        let title = match (&operation.success_title, verdict.succeeded) {
            (Some(success_title), true) => success_title.clone(),
            _ => operation.title.clone(),
        };
        let success_message = if verdict.succeeded {
            operation.success_message.clone()
        } else {
            None
        };

        Self {
            title,
            status: RunStatus::from_verdict(verdict),
            verdict,
            steps: project(state),
            success_message,
            dismissable: verdict.done,
        }
    }
}

/// The first failure's full report inside a fenced block, ready to paste
/// into a bug report.
pub fn error_report(state: &ProgressState) -> String {
    let details = state
        .failed
        .first()
        .map(|f| trim_leading_newlines(&f.extra_details))
        .unwrap_or(NO_ERROR_DETAILS);
    format!("```\n{}\n```", details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::install_sidestore;
    use crate::domain::OperationUpdate;

    fn state_after(updates: &[OperationUpdate]) -> ProgressState {
        updates
            .iter()
            .fold(ProgressState::new(install_sidestore()), |s, u| s.apply(u))
    }

    fn visuals(state: &ProgressState) -> Vec<&'static str> {
        project(state).iter().map(|v| v.visual.as_str()).collect()
    }

    #[test]
    fn test_all_waiting_initially() {
        let state = ProgressState::new(install_sidestore());
        assert_eq!(visuals(&state), vec!["waiting", "waiting", "waiting"]);
    }

    #[test]
    fn test_in_progress_and_waiting() {
        let state = state_after(&[
            OperationUpdate::started("download"),
            OperationUpdate::finished("download"),
            OperationUpdate::started("install"),
        ]);
        assert_eq!(visuals(&state), vec!["completed", "in_progress", "waiting"]);
    }

    #[test]
    fn test_failure_skips_unstarted_steps() {
        let state = state_after(&[
            OperationUpdate::started("download"),
            OperationUpdate::finished("download"),
            OperationUpdate::started("install"),
            OperationUpdate::failed("install", "Error:\n  ● disk full"),
        ]);
        let views = project(&state);
        assert_eq!(views[0].visual, StepVisual::Completed);
        assert_eq!(
            views[1].visual,
            StepVisual::Failed {
                summary: "disk full".to_string(),
                details: "Error:\n  ● disk full".to_string(),
            }
        );
        assert_eq!(views[2].visual, StepVisual::Skipped);
    }

    #[test]
    fn test_failed_beats_completed() {
        let state = state_after(&[
            OperationUpdate::started("download"),
            OperationUpdate::finished("download"),
            OperationUpdate::failed("download", "checksum mismatch"),
        ]);
        assert_eq!(visuals(&state)[0], "failed");
    }

    #[test]
    fn test_summary_takes_last_bullet_line() {
        let details = "\nInstall failed\n● could not sign app\n  ● certificate revoked\ntrailing";
        assert_eq!(short_error_summary(details), "certificate revoked");
    }

    #[test]
    fn test_summary_drops_text_before_bullet() {
        assert_eq!(short_error_summary("…● disk full"), "disk full");
    }

    #[test]
    fn test_summary_falls_back_to_trimmed_text() {
        assert_eq!(short_error_summary("\n  plain failure  \n"), "plain failure");
        assert_eq!(short_error_summary("   "), "");
    }

    #[test]
    fn test_summary_of_bare_bullet_is_empty() {
        assert_eq!(short_error_summary("oops\n●  "), "");
        assert_eq!(short_error_summary("● cause\n  ●"), "");
    }

    #[test]
    fn test_view_while_running() {
        let state = state_after(&[OperationUpdate::started("download")]);
        let view = OperationView::from_state(&state);
        assert_eq!(view.title, "Installing SideStore");
        assert_eq!(view.status, RunStatus::Running);
        assert_eq!(view.status.label(), "Please wait…");
        assert!(!view.dismissable);
    }

    #[test]
    fn test_view_on_success_uses_success_title() {
        let state = state_after(&[
            OperationUpdate::finished("download"),
            OperationUpdate::finished("install"),
            OperationUpdate::finished("pairing"),
        ]);
        let view = OperationView::from_state(&state);
        assert_eq!(view.title, "SideStore Installed");
        assert_eq!(view.status, RunStatus::Completed);
        assert!(view.dismissable);
    }

    #[test]
    fn test_view_on_failure_keeps_title() {
        let mut operation = install_sidestore();
        operation.success_message = Some("Enjoy".to_string());
        let state = ProgressState::new(operation)
            .apply(&OperationUpdate::started("download"))
            .apply(&OperationUpdate::failed("download", "x"));
        let view = OperationView::from_state(&state);
        assert_eq!(view.title, "Installing SideStore");
        assert_eq!(view.status, RunStatus::Failed);
        assert!(view.success_message.is_none());
    }

    #[test]
    fn test_error_report() {
        let state = state_after(&[
            OperationUpdate::failed("install", "\n\nfirst\n● cause"),
            OperationUpdate::failed("pairing", "second"),
        ]);
        assert_eq!(error_report(&state), "```\nfirst\n● cause\n```");

        let clean = ProgressState::new(install_sidestore());
        assert_eq!(error_report(&clean), "```\nNo error details\n```");
    }
}
