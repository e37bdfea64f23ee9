//! Human-readable rendering
//!
//! Every renderer caps list lengths from [`DisplaySettings`] and appends a
//! `... and N more` note when it drops entries. JSON output bypasses this
//! module and serializes the typed values directly.

use xcdiag_output::{ClassifiedError, Issue, ParsedOutput, ReconciledTests, TestSource};
use xcdiag_simctl::{OperationReport, Outcome};

use crate::config::DisplaySettings;

/// Shorten `message` to at most `max` characters, marking the cut with `...`.
pub fn truncate_message(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = message.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn push_issue(output: &mut String, issue: &Issue, display: &DisplaySettings) {
    let message = truncate_message(&issue.message, display.max_message_length);
    match issue.location() {
        Some(location) => output.push_str(&format!("  {}: {}\n", location, message)),
        None => output.push_str(&format!("  {}\n", message)),
    }
}

fn push_issue_list(output: &mut String, heading: &str, issues: &[Issue], display: &DisplaySettings) {
    if issues.is_empty() {
        return;
    }
    output.push_str(&format!("{} ({}):\n", heading, issues.len()));
    for issue in issues.iter().take(display.max_issues) {
        push_issue(output, issue, display);
    }
    if issues.len() > display.max_issues {
        output.push_str(&format!("  ... and {} more\n", issues.len() - display.max_issues));
    }
}

/// Aggregated console output
pub fn render_parsed(parsed: &ParsedOutput, display: &DisplaySettings) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Build: {}\n",
        if parsed.build_succeeded { "succeeded" } else { "FAILED" }
    ));
    if parsed.total_tests > 0 || !parsed.tests.is_empty() {
        output.push_str(&format!(
            "Tests: {} passed, {} failed ({} total)\n",
            parsed.passed_tests(),
            parsed.failed_tests,
            parsed.total_tests
        ));
    }

    push_issue_list(&mut output, "Errors", &parsed.errors, display);
    push_issue_list(&mut output, "Warnings", &parsed.warnings, display);

    let failed = parsed.failed_records();
    if !failed.is_empty() {
        output.push_str(&format!("Failing tests ({}):\n", failed.len()));
        for record in failed.iter().take(display.max_failing_tests) {
            match &record.failure_reason {
                Some(reason) => output.push_str(&format!(
                    "  {}: {}\n",
                    record.identity(),
                    truncate_message(reason, display.max_message_length)
                )),
                None => output.push_str(&format!("  {}\n", record.identity())),
            }
        }
        if failed.len() > display.max_failing_tests {
            output.push_str(&format!(
                "  ... and {} more\n",
                failed.len() - display.max_failing_tests
            ));
        }
    }

    output
}

/// Reconciled test counts
pub fn render_tests(tests: &ReconciledTests, display: &DisplaySettings) -> String {
    if tests.source == TestSource::None {
        return "No tests ran\n".to_string();
    }

    let mut output = format!(
        "Tests: {} passed, {} failed ({} total, from {})\n",
        tests.passed,
        tests.failed,
        tests.total(),
        match tests.source {
            TestSource::Xml => "report",
            _ => "console",
        }
    );

    for test in tests.failing_tests.iter().take(display.max_failing_tests) {
        let name = match &test.class_name {
            Some(class) => format!("{}.{}", class, test.name),
            None => test.name.clone(),
        };
        match &test.reason {
            Some(reason) => output.push_str(&format!(
                "  ✘ {}: {}\n",
                name,
                truncate_message(reason, display.max_message_length)
            )),
            None => output.push_str(&format!("  ✘ {}\n", name)),
        }
    }
    if tests.failing_tests.len() > display.max_failing_tests {
        output.push_str(&format!(
            "  ... and {} more\n",
            tests.failing_tests.len() - display.max_failing_tests
        ));
    }

    output
}

/// One classified failure
pub fn render_error(error: &ClassifiedError, display: &DisplaySettings) -> String {
    let mut output = format!("error[{}]: {}\n", error.kind, error.title);
    if !error.details.is_empty() {
        output.push_str(&truncate_message(&error.details, display.max_message_length));
        output.push('\n');
    }
    push_issue_list(&mut output, "Issues", &error.issues, display);
    if let Some(suggestion) = &error.suggestion {
        output.push_str(&format!("hint: {}\n", suggestion));
    }
    output
}

/// Lifecycle operation result
pub fn render_operation(report: &OperationReport) -> String {
    let diagnostics = report.diagnostics();
    let mut output = format!("{}: {}\n", report.operation().as_str(), report.label());

    if let (Some(name), Some(id)) = (&diagnostics.device_name, &diagnostics.device_id) {
        output.push_str(&format!("Device: {} ({})\n", name, id));
    }
    if let Some(runtime) = &diagnostics.runtime_identifier {
        output.push_str(&format!("Runtime: {}\n", runtime));
    }
    if let Some(state) = diagnostics.state_before {
        output.push_str(&format!("State before: {}\n", state));
    }
    if let Some(app) = &diagnostics.app_path {
        output.push_str(&format!("App: {}\n", app));
    }
    if matches!(report.outcome(), Outcome::AlreadyBooted | Outcome::AlreadyShutdown) {
        output.push_str("No change needed\n");
    }
    output
}
