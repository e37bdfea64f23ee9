//! Record types produced by the line classifier
//!
//! `Issue` and `TestRecord` are the two record shapes that survive
//! aggregation; `LineRecord` is the per-line union handed to the aggregator.

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Error,
    Warning,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Error => "error",
            IssueKind::Warning => "warning",
        }
    }
}

/// One diagnostic extracted from toolchain output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,

    /// Source file, when the line carried a `file:line:column:` prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// Message with marker, styling and severity word removed
    pub message: String,

    /// The line as it appeared in the output (styling removed)
    pub raw_text: String,
}

/// Identity of an issue inside one aggregated result.
///
/// Issues without a location key on their message alone, which is the same
/// as a key whose location fields are all `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueKey {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

impl Issue {
    pub fn key(&self) -> IssueKey {
        IssueKey {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
            message: self.message.clone(),
        }
    }

    /// Whether this issue points at a source location (a compiler diagnostic)
    pub fn has_location(&self) -> bool {
        self.file.is_some()
    }

    /// Whether the line carried the `❌` error marker
    pub fn is_marked(&self) -> bool {
        self.raw_text.starts_with(crate::line::ERROR_GLYPH)
    }

    /// `file:line:column` when known
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        Some(match (self.line, self.column) {
            (Some(line), Some(column)) => format!("{}:{}:{}", file, line, column),
            (Some(line), None) => format!("{}:{}", file, line),
            _ => file.clone(),
        })
    }
}

/// One test result seen in console output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Test name (method name for XCTest, function name for Swift Testing)
    pub name: String,

    /// Owning class or suite, when the output format names it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TestRecord {
    /// Qualified name used as the record identity within one run
    pub fn identity(&self) -> String {
        match &self.suite {
            Some(suite) => format!("{}.{}", suite, self.name),
            None => self.name.clone(),
        }
    }

    /// Fold a later occurrence of the same test into this one.
    ///
    /// Outcome always follows the later record; duration and reason are only
    /// replaced when the later record carries a value.
    pub fn absorb(&mut self, later: &TestRecord) {
        self.passed = later.passed;
        if later.duration_seconds.is_some() {
            self.duration_seconds = later.duration_seconds;
        }
        if later.failure_reason.is_some() {
            self.failure_reason = later.failure_reason.clone();
        }
        if self.suite.is_none() {
            self.suite = later.suite.clone();
        }
    }
}

/// Classification of a single output line
#[derive(Debug, Clone, PartialEq)]
pub enum LineRecord {
    Issue(Issue),
    Test(TestRecord),
    /// `Executed N tests, with M failures`
    Summary { total: u32, failed: u32 },
    /// `** BUILD FAILED **`
    BuildFailed,
    /// `** TEST FAILED **`
    TestFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, passed: bool) -> TestRecord {
        TestRecord {
            name: name.to_string(),
            suite: None,
            passed,
            duration_seconds: None,
            failure_reason: None,
        }
    }

    #[test]
    fn test_issue_key_ignores_kind_and_raw_text() {
        let a = Issue {
            kind: IssueKind::Error,
            file: Some("/a.swift".to_string()),
            line: Some(1),
            column: Some(2),
            message: "boom".to_string(),
            raw_text: "arm64: /a.swift:1:2: error: boom".to_string(),
        };
        let mut b = a.clone();
        b.raw_text = "x86_64: /a.swift:1:2: error: boom".to_string();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_location_formatting() {
        let mut issue = Issue {
            kind: IssueKind::Warning,
            file: Some("/a.swift".to_string()),
            line: Some(3),
            column: None,
            message: "m".to_string(),
            raw_text: String::new(),
        };
        assert_eq!(issue.location().as_deref(), Some("/a.swift:3"));
        issue.column = Some(9);
        assert_eq!(issue.location().as_deref(), Some("/a.swift:3:9"));
        issue.file = None;
        assert!(issue.location().is_none());
    }

    #[test]
    fn test_absorb_keeps_richer_fields() {
        let mut first = record("testLogin", false);
        first.failure_reason = Some("XCTAssertTrue failed".to_string());

        let mut later = record("testLogin", false);
        later.duration_seconds = Some(0.25);
        first.absorb(&later);

        assert_eq!(first.duration_seconds, Some(0.25));
        assert_eq!(first.failure_reason.as_deref(), Some("XCTAssertTrue failed"));
    }

    #[test]
    fn test_identity_includes_suite() {
        let mut r = record("testExample", true);
        assert_eq!(r.identity(), "testExample");
        r.suite = Some("AppTests.LoginTests".to_string());
        assert_eq!(r.identity(), "AppTests.LoginTests.testExample");
    }
}
