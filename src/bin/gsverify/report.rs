// Human-readable result lines for the CLI.
//
// The library returns outcomes as values; this module decides how they are shown.

use gsverify_rs::config::Config;
use gsverify_rs::types::{
    CleanupAction, FixtureReport, ReconcileOutcome, SetupOutcome,
};
use gsverify_rs::ScenarioReport;

/// Whether result lines go to stdout.
///
/// Returns `false` when JSON logging is enabled (plain text would corrupt JSON output).
pub fn is_show_result_needed(config: &Config) -> bool {
    config
        .tracing_config
        .as_ref()
        .is_none_or(|tracing| !tracing.json_tracing)
}

pub fn setup_line(report: &FixtureReport<SetupOutcome>) -> String {
    let outcome = match &report.outcome {
        SetupOutcome::AlreadyPresent => "already present".to_string(),
        SetupOutcome::Uploaded => "uploaded".to_string(),
        SetupOutcome::NotApplicable => "nothing to upload".to_string(),
        SetupOutcome::Failed { kind, message } => {
            format!("failed ({kind:?}): {}", message.trim())
        }
    };
    format!("{}: {outcome}", report.fixture_id)
}

pub fn reconcile_line(report: &FixtureReport<ReconcileOutcome>) -> String {
    let outcome = match &report.outcome {
        ReconcileOutcome::Cleaned(CleanupAction::Deleted) => "deleted".to_string(),
        ReconcileOutcome::Cleaned(CleanupAction::MovedBack) => "moved back".to_string(),
        ReconcileOutcome::SkippedAbsent => "already clean".to_string(),
        ReconcileOutcome::SkippedRaceLost => "cleaned by another worker".to_string(),
        ReconcileOutcome::SkippedPermission { message } => {
            format!("skipped, permission denied: {}", message.trim())
        }
        ReconcileOutcome::SkippedOther { message } => format!("skipped: {}", message.trim()),
        ReconcileOutcome::NotApplicable => "not applicable".to_string(),
    };
    format!("{}: {outcome}", report.fixture_id)
}

pub fn scenario_lines(report: &ScenarioReport) -> Vec<String> {
    let verdict = if report.passed { "PASS" } else { "FAIL" };
    let mut lines = vec![format!("{verdict} {}", report.scenario_id)];
    lines.extend(report.failures.iter().map(|f| format!("    - {f}")));
    lines.extend(report.notes.iter().map(|n| format!("    note: {n}")));
    lines
}

pub fn summary_line(reports: &[ScenarioReport]) -> String {
    let passed = reports.iter().filter(|r| r.passed).count();
    format!(
        "{passed} passed, {} failed, {} total",
        reports.len() - passed,
        reports.len()
    )
}
