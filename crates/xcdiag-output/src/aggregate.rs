//! Output aggregation
//!
//! Folds every line of one build/test invocation through the line classifier
//! into a single [`ParsedOutput`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::line::classify_line;
use crate::record::{Issue, IssueKey, IssueKind, LineRecord, TestRecord};

/// Banner / header lines xcodebuild prints before any real work
const HEADER_PREFIXES: &[&str] = &[
    "Command line invocation:",
    "User defaults from command line:",
    "Build settings from command line:",
    "Prepare packages",
    "Resolve Package Graph",
    "Resolved source packages:",
    "ComputeTargetDependencyGraph",
    "note: Using ",
    "note: Building targets in dependency order",
];

/// Consolidated result of parsing one invocation's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedOutput {
    /// Error issues, unique by (file, line, column, message), first-seen order
    pub errors: Vec<Issue>,

    /// Warning issues, same identity rule as `errors`
    pub warnings: Vec<Issue>,

    /// Test records in output order; repeats are kept
    pub tests: Vec<TestRecord>,

    /// False once an error marker or build-failure sentinel was seen
    pub build_succeeded: bool,

    /// False once a failing test, test-failure sentinel, or failing summary was seen
    pub tests_passed: bool,

    pub total_tests: u32,
    pub failed_tests: u32,

    /// Whether an `Executed N tests` summary line supplied the counts
    pub summary_seen: bool,
}

impl Default for ParsedOutput {
    fn default() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            tests: Vec::new(),
            build_succeeded: true,
            tests_passed: true,
            total_tests: 0,
            failed_tests: 0,
            summary_seen: false,
        }
    }
}

impl ParsedOutput {
    pub fn passed_tests(&self) -> u32 {
        self.total_tests.saturating_sub(self.failed_tests)
    }

    /// Error issues that carry a source location
    pub fn compiler_errors(&self) -> impl Iterator<Item = &Issue> {
        self.errors.iter().filter(|i| i.has_location())
    }

    /// Test records merged by identity, in order of first appearance.
    ///
    /// A later occurrence sets the outcome and overwrites duration and
    /// failure reason when it carries them.
    pub fn merged_tests(&self) -> Vec<TestRecord> {
        let mut order: Vec<TestRecord> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for record in &self.tests {
            let identity = record.identity();
            match index.get(&identity) {
                Some(&i) => order[i].absorb(record),
                None => {
                    index.insert(identity, order.len());
                    order.push(record.clone());
                }
            }
        }

        order
    }

    /// Failed records after identity merge
    pub fn failed_records(&self) -> Vec<TestRecord> {
        self.merged_tests().into_iter().filter(|t| !t.passed).collect()
    }
}

/// Insertion-ordered set of issues keyed by identity
#[derive(Default)]
struct IssueSet {
    seen: HashSet<IssueKey>,
    issues: Vec<Issue>,
}

impl IssueSet {
    fn insert(&mut self, issue: Issue) -> bool {
        if self.seen.insert(issue.key()) {
            self.issues.push(issue);
            true
        } else {
            false
        }
    }
}

/// Parse the full output of one invocation.
pub fn parse_output(output: &str) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();
    let mut errors = IssueSet::default();
    let mut warnings = IssueSet::default();
    let mut summary: Option<(u32, u32)> = None;
    let mut duplicates = 0usize;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_header(trimmed) {
            continue;
        }

        let Some(record) = classify_line(line) else {
            continue;
        };

        match record {
            LineRecord::Issue(issue) => {
                let inserted = match issue.kind {
                    IssueKind::Error => {
                        parsed.build_succeeded = false;
                        errors.insert(issue)
                    }
                    IssueKind::Warning => warnings.insert(issue),
                };
                if !inserted {
                    duplicates += 1;
                }
            }
            LineRecord::Test(test) => {
                if !test.passed {
                    parsed.tests_passed = false;
                }
                parsed.tests.push(test);
            }
            LineRecord::Summary { total, failed } => {
                if failed > 0 {
                    parsed.tests_passed = false;
                }
                summary = Some((total, failed));
            }
            LineRecord::BuildFailed => parsed.build_succeeded = false,
            LineRecord::TestFailed => parsed.tests_passed = false,
        }
    }

    match summary {
        Some((total, failed)) => {
            parsed.total_tests = total;
            parsed.failed_tests = failed;
            parsed.summary_seen = true;
        }
        None => {
            parsed.total_tests = parsed.tests.len() as u32;
            parsed.failed_tests = parsed.tests.iter().filter(|t| !t.passed).count() as u32;
        }
    }

    parsed.errors = errors.issues;
    parsed.warnings = warnings.issues;

    debug!(
        errors = parsed.errors.len(),
        warnings = parsed.warnings.len(),
        tests = parsed.tests.len(),
        duplicates,
        build_succeeded = parsed.build_succeeded,
        "parsed toolchain output"
    );

    parsed
}

pub(crate) fn is_header(line: &str) -> bool {
    HEADER_PREFIXES.iter().any(|p| line.starts_with(p))
}
