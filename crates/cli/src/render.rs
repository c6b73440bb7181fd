//! Terminal rendering of a run.

use colored::Colorize;
use opwatch_core::{error_report, project, OperationView, ProgressState, RunStatus, StepVisual};

/// Prints a line whenever a step's display state changes.
#[derive(Debug, Default)]
pub struct StepPrinter {
    last: Vec<Option<StepVisual>>,
}

impl StepPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines for the steps whose state differs from the previous call.
    pub fn changes(&mut self, state: &ProgressState) -> Vec<String> {
        let views = project(state);
        self.last.resize(views.len(), None);

        let mut lines = Vec::new();
        for (view, last) in views.iter().zip(self.last.iter_mut()) {
            if last.as_ref() == Some(&view.visual) {
                continue;
            }
            // Nothing to report for a step that has not moved yet.
            if last.is_none() && view.visual == StepVisual::Waiting {
                *last = Some(view.visual.clone());
                continue;
            }
            lines.push(step_line(&view.step.label, &view.visual));
            *last = Some(view.visual.clone());
        }
        lines
    }
}

pub fn step_line(label: &str, visual: &StepVisual) -> String {
    match visual {
        StepVisual::Failed { summary, .. } => {
            format!("  {} {} {}", "✗".red().bold(), label, summary.dimmed())
        }
        StepVisual::Completed => format!("  {} {}", "✓".green().bold(), label),
        StepVisual::InProgress => format!("  {} {}", "◐".cyan(), label),
        StepVisual::Skipped => format!("  {} {}", "-".dimmed(), label.dimmed()),
        StepVisual::Waiting => format!("  {} {}", "○".dimmed(), label),
    }
}

/// Closing summary: the title, the status and the error report on failure.
pub fn summary(state: &ProgressState) -> String {
    let view = OperationView::from_state(state);
    let status = match view.status {
        RunStatus::Completed => view.status.label().green().bold(),
        RunStatus::Failed => view.status.label().red().bold(),
        RunStatus::Running => view.status.label().yellow(),
    };

    let mut out = format!("{} {}", view.title.bold(), status);
    if let Some(message) = &view.success_message {
        out.push('\n');
        out.push_str(message);
    }
    if view.status == RunStatus::Failed {
        out.push('\n');
        out.push_str(&error_report(state));
    }
    out
}
