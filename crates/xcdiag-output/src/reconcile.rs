//! Test result reconciliation
//!
//! Merges XML test reports (when usable) with console-derived results.
//! Structured counts win; human-readable failure reasons are recovered from
//! console text when a report does not carry them. Report files are removed
//! once read, whatever the outcome.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::ParsedOutput;
use crate::junit::{read_report, single_line};
use crate::line::strip_styling;

/// Default number of lines scanned after a Swift Testing issue line for
/// `↳` continuation lines.
pub const DEFAULT_CONTINUATION_WINDOW: usize = 5;

const CONTINUATION_INDICATOR: char = '↳';

/// Line prefixes that start a new test's output
const TEST_MARKER_PREFIXES: &[&str] = &["✔", "✘", "✖", "✗", "✓", "◇", "􀟈", "􀢄", "Test Case '", "Test Suite '"];

/// Where the reconciled counts came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestSource {
    Xml,
    Console,
    None,
}

/// A failing test with the best available reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingTest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Final test counts for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledTests {
    pub passed: u32,
    pub failed: u32,
    pub failing_tests: Vec<FailingTest>,
    pub source: TestSource,
}

impl ReconciledTests {
    /// No applicable tests; not a failure
    pub fn empty() -> Self {
        Self {
            passed: 0,
            failed: 0,
            failing_tests: Vec::new(),
            source: TestSource::None,
        }
    }

    pub fn total(&self) -> u32 {
        self.passed.saturating_add(self.failed)
    }

    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Removes transient report files when dropped.
pub struct ReportCleanup {
    paths: Vec<PathBuf>,
}

impl ReportCleanup {
    pub fn new(paths: &[PathBuf]) -> Self {
        Self {
            paths: paths.to_vec(),
        }
    }
}

impl Drop for ReportCleanup {
    fn drop(&mut self) {
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed test report"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove test report"),
            }
        }
    }
}

/// Report paths a `swift test --xunit-output <base>` run produces: the
/// XCTest report at `base` and the Swift Testing report next to it with a
/// `-swift-testing` suffix on the file stem.
pub fn report_paths_for(base: &Path) -> [PathBuf; 2] {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tests".to_string());
    let file_name = match base.extension() {
        Some(ext) => format!("{}-swift-testing.{}", stem, ext.to_string_lossy()),
        None => format!("{}-swift-testing", stem),
    };
    [base.to_path_buf(), base.with_file_name(file_name)]
}

/// Reconcile report files with console output.
///
/// `reports` holds zero or more XML report paths; each is parsed on its own
/// and contributes only when it declares a non-zero test count. All paths
/// are deleted before this function returns.
pub fn reconcile(
    reports: &[PathBuf],
    console: &str,
    parsed: &ParsedOutput,
    continuation_window: usize,
) -> ReconciledTests {
    let _cleanup = ReportCleanup::new(reports);

    let mut passed = 0u32;
    let mut failed = 0u32;
    let mut failing_tests = Vec::new();
    let mut usable = false;

    for path in reports {
        if !path.exists() {
            debug!(path = %path.display(), "test report not present");
            continue;
        }

        let report = match read_report(path) {
            Ok(report) => report,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable test report");
                continue;
            }
        };

        if report.declared_tests == 0 {
            debug!(path = %path.display(), "test report declares no tests");
            continue;
        }

        usable = true;
        passed = passed.saturating_add(report.passed());
        failed = failed.saturating_add(report.declared_failures);

        for case in report.failing_cases() {
            let rich = case.failure.as_ref().and_then(|f| f.message.clone());
            let reason = rich.or_else(|| {
                console_failure_reason(console, &case.class_name, &case.name, continuation_window)
            });
            failing_tests.push(FailingTest {
                class_name: Some(case.class_name.clone()).filter(|c| !c.is_empty()),
                name: case.name.clone(),
                reason,
            });
        }
    }

    if usable {
        return ReconciledTests {
            passed,
            failed,
            failing_tests,
            source: TestSource::Xml,
        };
    }

    from_console(console, parsed, continuation_window)
}

/// Console-only reconciliation.
pub fn from_console(console: &str, parsed: &ParsedOutput, continuation_window: usize) -> ReconciledTests {
    let failed_records = parsed.failed_records();

    if parsed.total_tests == 0 && failed_records.is_empty() {
        return ReconciledTests::empty();
    }

    let failing_tests = failed_records
        .into_iter()
        .map(|record| {
            let reason = record.failure_reason.clone().or_else(|| {
                console_failure_reason(
                    console,
                    record.suite.as_deref().unwrap_or_default(),
                    &record.name,
                    continuation_window,
                )
            });
            FailingTest {
                class_name: record.suite,
                name: record.name,
                reason,
            }
        })
        .collect::<Vec<_>>();

    // A summary line is authoritative; markers only fill in when none was printed.
    let failed = if parsed.summary_seen {
        parsed.failed_tests
    } else {
        parsed.failed_tests.max(failing_tests.len() as u32)
    };
    ReconciledTests {
        passed: parsed.total_tests.saturating_sub(failed),
        failed,
        failing_tests,
        source: TestSource::Console,
    }
}

/// Recover a failure reason for `class_name`/`name` from console text.
///
/// Tries the XCTest bracketed form first, then the Swift Testing
/// `recorded an issue` form.
pub fn console_failure_reason(
    console: &str,
    class_name: &str,
    name: &str,
    continuation_window: usize,
) -> Option<String> {
    xctest_failure_reason(console, class_name, name)
        .or_else(|| swift_testing_failure_reason(console, name, continuation_window))
}

/// `file:line: error: -[Class method] : reason`
pub fn xctest_failure_reason(console: &str, class_name: &str, method: &str) -> Option<String> {
    if class_name.is_empty() {
        return None;
    }
    let short_class = class_name.rsplit('.').next().unwrap_or(class_name);
    let needles = [
        format!("-[{} {}] : ", class_name, method),
        format!("-[{} {}] : ", short_class, method),
        format!("{}.{} : ", class_name, method),
    ];

    let mut reasons: Vec<String> = Vec::new();
    for line in console.lines() {
        let line = strip_styling(line);
        for needle in &needles {
            if let Some(pos) = line.find(needle.as_str()) {
                let reason = line[pos + needle.len()..].trim().to_string();
                if !reason.is_empty() && !reasons.contains(&reason) {
                    reasons.push(reason);
                }
                break;
            }
        }
    }

    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join("; "))
    }
}

/// `✘ Test name() recorded an issue at file:line:col: reason` plus any
/// `↳` continuation lines that follow within the window.
pub fn swift_testing_failure_reason(console: &str, name: &str, window: usize) -> Option<String> {
    let mut names = vec![name.to_string()];
    if !name.contains('(') {
        names.push(format!("{}()", name));
    }

    let lines: Vec<String> = console.lines().map(strip_styling).collect();

    for (i, line) in lines.iter().enumerate() {
        let Some(after) = names.iter().find_map(|n| {
            let needle = format!("Test {} recorded an issue", n);
            line.find(&needle).map(|pos| &line[pos + needle.len()..])
        }) else {
            continue;
        };

        let mut reason = regex!(r"^(?:\s+at\s+\S+?:\d+(?::\d+)?)?:\s*(.*)$")
            .captures(after)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| after.trim_start_matches(':').trim().to_string());

        for next in lines.iter().skip(i + 1).take(window) {
            let trimmed = next.trim();
            if let Some(continuation) = trimmed.strip_prefix(CONTINUATION_INDICATOR) {
                let continuation = continuation.trim();
                if !continuation.is_empty() {
                    if !reason.is_empty() {
                        reason.push(' ');
                    }
                    reason.push_str(continuation);
                }
            } else if TEST_MARKER_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
                break;
            }
        }

        let reason = single_line(&reason);
        if !reason.is_empty() {
            return Some(reason);
        }
    }

    None
}
