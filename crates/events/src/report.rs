//! Diagnostic reports for failed steps.
//!
//! Each error in a source chain becomes one bulleted line, indented one
//! level deeper than its parent. Front ends show the last bulleted line as
//! the short summary, which is the root cause.

use std::error::Error;
use std::fmt::Write;

use opwatch_core::projection::DIAGNOSTIC_BULLET;

const INDENT: &str = "  ";

/// Render `error` and its sources as a bulleted report.
pub fn format_error_report(error: &(dyn Error + 'static)) -> String {
    let mut report = String::new();
    let mut current: Option<&(dyn Error + 'static)> = Some(error);
    let mut depth = 0;

    while let Some(err) = current {
        if depth > 0 {
            report.push('\n');
        }
        let _ = write!(
            report,
            "{}{} {}",
            INDENT.repeat(depth),
            DIAGNOSTIC_BULLET,
            err
        );
        current = err.source();
        depth += 1;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use opwatch_core::short_error_summary;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    #[derive(Debug, Error)]
    #[error("could not write IPA")]
    struct WriteFailed(#[source] DiskFull);

    #[derive(Debug, Error)]
    #[error("install failed")]
    struct InstallFailed(#[source] WriteFailed);

    #[test]
    fn test_single_error() {
        assert_eq!(format_error_report(&DiskFull), "● disk full");
    }

    #[test]
    fn test_chain_is_indented() {
        let report = format_error_report(&InstallFailed(WriteFailed(DiskFull)));
        assert_eq!(
            report,
            "● install failed\n  ● could not write IPA\n    ● disk full"
        );
    }

    #[test]
    fn test_summary_is_root_cause() {
        let report = format_error_report(&InstallFailed(WriteFailed(DiskFull)));
        assert_eq!(short_error_summary(&report), "disk full");
    }
}
