//! Single-line classification
//!
//! Turns one line of xcodebuild / swift test output into at most one
//! [`LineRecord`]. Every function here is a pure function of its input line.
//!
//! Recognized families, checked in this order:
//! - failure sentinels (`** BUILD FAILED **`, `** TEST FAILED **`)
//! - summary lines (`Executed N tests, with M failures`)
//! - test markers: `✔ name (D seconds)`, `✖ name, reason` (also `✘`, `✗`),
//!   `Test Case '-[Class method]' passed|failed (D seconds)`, then the
//!   Swift Testing `✔ Test name() passed after D seconds` form
//! - error markers (`❌`, `path:line:col: error:`, `error:`)
//! - warning markers (`⚠️`, `path:line:col: warning:`, `warning:`)

use crate::record::{Issue, IssueKind, LineRecord, TestRecord};

pub(crate) const ERROR_GLYPH: &str = "❌";
const WARNING_GLYPHS: &[&str] = &["⚠️", "⚠"];

const BUILD_FAILED_SENTINELS: &[&str] = &["** BUILD FAILED **", "BUILD FAILED"];
const TEST_FAILED_SENTINELS: &[&str] = &[
    "** TEST FAILED **",
    "** TEST EXECUTE FAILED **",
    "TEST FAILED",
];

/// Classify one line of output.
pub fn classify_line(line: &str) -> Option<LineRecord> {
    let cleaned = strip_styling(line);
    let text = cleaned.trim();
    if text.is_empty() {
        return None;
    }

    if BUILD_FAILED_SENTINELS.contains(&text) {
        return Some(LineRecord::BuildFailed);
    }
    if TEST_FAILED_SENTINELS.contains(&text) {
        return Some(LineRecord::TestFailed);
    }

    if let Some((total, failed)) = parse_summary(text) {
        return Some(LineRecord::Summary { total, failed });
    }

    if let Some(test) = parse_test_marker(text) {
        return Some(LineRecord::Test(test));
    }

    parse_issue(text).map(LineRecord::Issue)
}

/// Remove ANSI SGR / cursor escape sequences.
pub fn strip_styling(line: &str) -> String {
    if !line.contains('\u{1b}') {
        return line.to_string();
    }
    regex!(r"\x1b\[[0-9;?]*[A-Za-z]").replace_all(line, "").into_owned()
}

/// `Executed N tests, with M failures` -> `(N, M)`
pub fn parse_summary(text: &str) -> Option<(u32, u32)> {
    let caps = regex!(r"Executed (\d+) tests?, with (\d+) failures?").captures(text)?;
    let total = caps.get(1)?.as_str().parse().ok()?;
    let failed = caps.get(2)?.as_str().parse().ok()?;
    Some((total, failed))
}

/// Try each test-marker format in order; first match wins.
pub fn parse_test_marker(text: &str) -> Option<TestRecord> {
    parse_modern_pass(text)
        .or_else(|| parse_modern_fail(text))
        .or_else(|| parse_classic(text))
        .or_else(|| parse_swift_testing(text))
}

fn parse_modern_pass(text: &str) -> Option<TestRecord> {
    let caps = regex!(r"^[✔✓]\s+(.+?)\s+\((\d+(?:\.\d+)?)\s*seconds?\)").captures(text)?;
    Some(TestRecord {
        name: caps.get(1)?.as_str().trim().to_string(),
        suite: None,
        passed: true,
        duration_seconds: caps.get(2).and_then(|m| m.as_str().parse().ok()),
        failure_reason: None,
    })
}

fn parse_modern_fail(text: &str) -> Option<TestRecord> {
    let caps = regex!(r"^[✖✘✗]\s+(.+?)(?:,\s*(.*))?$").captures(text)?;
    // `✘ Test ...` lines belong to Swift Testing
    if caps.get(1)?.as_str().starts_with("Test ") {
        return None;
    }
    let reason = caps
        .get(2)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(TestRecord {
        name: caps.get(1)?.as_str().trim().to_string(),
        suite: None,
        passed: false,
        duration_seconds: None,
        failure_reason: reason,
    })
}

fn parse_classic(text: &str) -> Option<TestRecord> {
    let caps = regex!(
        r"Test Case '-\[(\S+) ([^\]\s]+)\]' (passed|failed) \((\d+(?:\.\d+)?) seconds\)"
    )
    .captures(text)?;
    Some(TestRecord {
        name: caps.get(2)?.as_str().to_string(),
        suite: Some(caps.get(1)?.as_str().to_string()),
        passed: caps.get(3)?.as_str() == "passed",
        duration_seconds: caps.get(4).and_then(|m| m.as_str().parse().ok()),
        failure_reason: None,
    })
}

fn parse_swift_testing(text: &str) -> Option<TestRecord> {
    // Names end in `)` or a closing quote; this keeps `Test run with N tests`
    // summary lines out.
    let caps = regex!(r#"^[✔✘]\s+Test\s+(\S.*?[)"])\s+(passed|failed)\s+after\s+(\d+(?:\.\d+)?)\s+seconds"#)
        .captures(text)?;
    Some(TestRecord {
        name: caps.get(1)?.as_str().trim_matches('"').to_string(),
        suite: None,
        passed: caps.get(2)?.as_str() == "passed",
        duration_seconds: caps.get(3).and_then(|m| m.as_str().parse().ok()),
        failure_reason: None,
    })
}

/// Recognize an error or warning marker line and decompose it.
pub fn parse_issue(text: &str) -> Option<Issue> {
    if let Some(rest) = text.strip_prefix(ERROR_GLYPH) {
        return Some(decompose(IssueKind::Error, rest.trim(), text));
    }
    for glyph in WARNING_GLYPHS {
        if let Some(rest) = text.strip_prefix(glyph) {
            return Some(decompose(IssueKind::Warning, rest.trim(), text));
        }
    }

    // Unmarked compiler output: `path:line[:col]: error: message`
    if let Some(caps) =
        regex!(r"^(.+?):(\d+)(?::(\d+))?:\s*(?:fatal\s+)?(error|warning):\s*(.*)$").captures(text)
    {
        let kind = severity(caps.get(4)?.as_str());
        let message = caps.get(5)?.as_str().trim();
        if is_test_assertion(message) {
            return None;
        }
        return Some(Issue {
            kind,
            file: Some(caps.get(1)?.as_str().to_string()),
            line: caps.get(2).and_then(|m| m.as_str().parse().ok()),
            column: caps.get(3).and_then(|m| m.as_str().parse().ok()),
            message: message.to_string(),
            raw_text: text.to_string(),
        });
    }

    // Tool-prefixed or bare: `xcodebuild: error: ...`, `ld: warning: ...`, `error: ...`
    let caps = regex!(r"^(?:[\w.+-]+:\s*)?(error|warning):\s*(.*)$").captures(text)?;
    Some(Issue {
        kind: severity(caps.get(1)?.as_str()),
        file: None,
        line: None,
        column: None,
        message: caps.get(2)?.as_str().trim().to_string(),
        raw_text: text.to_string(),
    })
}

/// Split a marker remainder into location and message.
///
/// A single anchored pattern; on mismatch the whole remainder is the message.
fn decompose(kind: IssueKind, rest: &str, raw: &str) -> Issue {
    let located = regex!(
        r"^(.+?):(\d+)(?::(\d+))?:\s*(?:(?:fatal\s+)?(?:error|warning)\s*:\s*)?(.*)$"
    )
    .captures(rest);

    if let Some(caps) = located {
        let file = caps.get(1).map(|m| m.as_str().trim().to_string());
        let message = caps.get(4).map(|m| m.as_str().trim()).unwrap_or_default();
        if file.as_deref().is_some_and(|f| !f.is_empty()) && !message.is_empty() {
            return Issue {
                kind,
                file,
                line: caps.get(2).and_then(|m| m.as_str().parse().ok()),
                column: caps.get(3).and_then(|m| m.as_str().parse().ok()),
                message: message.to_string(),
                raw_text: raw.to_string(),
            };
        }
    }

    let message = regex!(r"^(?:[\w.+-]+:\s*)?(?:error|warning):\s*")
        .replace(rest, "")
        .trim()
        .to_string();
    Issue {
        kind,
        file: None,
        line: None,
        column: None,
        message: if message.is_empty() { rest.to_string() } else { message },
        raw_text: raw.to_string(),
    }
}

fn severity(word: &str) -> IssueKind {
    if word == "warning" {
        IssueKind::Warning
    } else {
        IssueKind::Error
    }
}

/// XCTest assertion failures are printed as compiler-style error lines
/// (`file:line: error: -[Class method] : reason`). They describe test
/// failures, not build diagnostics.
fn is_test_assertion(message: &str) -> bool {
    regex!(r"^-\[\S+ \S+\] : ").is_match(message)
        || regex!(r"^[\w.]+\.\w+ : ").is_match(message)
}
