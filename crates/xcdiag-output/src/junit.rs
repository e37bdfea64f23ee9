//! JUnit-style XML test report reader
//!
//! Reads the `testsuites/testsuite/testcase/failure` subset that
//! `swift test --xunit-output` writes for XCTest and Swift Testing. The
//! reader scans elements and attributes with patterns instead of building a
//! document tree; anything it cannot make sense of is reported as
//! [`JunitError::Malformed`] so callers can fall back to console output.

use std::fs;
use std::path::{Path, PathBuf};

use regex_lite::Captures;
use thiserror::Error;

/// Failure messages that carry no information beyond "it failed"
const GENERIC_FAILURE_MESSAGES: &[&str] = &["", "failed", "failure"];

/// Errors reading a report
#[derive(Debug, Error)]
pub enum JunitError {
    #[error("failed to read report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed report: {0}")]
    Malformed(String),
}

/// One parsed report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JunitReport {
    /// Declared test count (root `tests`, else the sum over suites)
    pub declared_tests: u32,
    /// Declared failure count (failures + errors), else the failing case count
    pub declared_failures: u32,
    pub cases: Vec<JunitCase>,
}

/// One `<testcase>`
#[derive(Debug, Clone, PartialEq)]
pub struct JunitCase {
    pub class_name: String,
    pub name: String,
    pub failure: Option<JunitFailure>,
}

/// The `<failure>` / `<error>` child of a test case
#[derive(Debug, Clone, PartialEq)]
pub struct JunitFailure {
    /// Single-line, entity-decoded message when the report carried a rich one
    pub message: Option<String>,
}

impl JunitReport {
    pub fn passed(&self) -> u32 {
        self.declared_tests.saturating_sub(self.declared_failures)
    }

    pub fn failing_cases(&self) -> impl Iterator<Item = &JunitCase> {
        self.cases.iter().filter(|c| c.failure.is_some())
    }
}

/// Read and parse a report file.
pub fn read_report(path: &Path) -> Result<JunitReport, JunitError> {
    let content = fs::read_to_string(path).map_err(|source| JunitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_report(&content)
}

/// Parse report text.
pub fn parse_report(xml: &str) -> Result<JunitReport, JunitError> {
    let root_tests = regex!(r"<testsuites\b([^>]*)>")
        .captures(xml)
        .and_then(|caps| attribute(caps.get(1)?.as_str(), "tests"))
        .and_then(|v| v.parse::<u32>().ok());

    let mut suite_tests: Option<u32> = None;
    let mut suite_failures: Option<u32> = None;
    let mut saw_suite = false;

    for caps in regex!(r"<testsuite\b([^>]*?)/?>").captures_iter(xml) {
        saw_suite = true;
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if let Some(n) = attribute(attrs, "tests").and_then(|v| v.parse::<u32>().ok()) {
            suite_tests = Some(add_count(suite_tests, n, "tests")?);
        }
        for key in ["failures", "errors"] {
            if let Some(n) = attribute(attrs, key).and_then(|v| v.parse::<u32>().ok()) {
                suite_failures = Some(add_count(suite_failures, n, key)?);
            }
        }
    }

    if root_tests.is_none() && !saw_suite {
        return Err(JunitError::Malformed(
            "no <testsuites> or <testsuite> element".to_string(),
        ));
    }

    let cases = parse_cases(xml);
    let failing = cases.iter().filter(|c| c.failure.is_some()).count() as u32;

    Ok(JunitReport {
        declared_tests: root_tests.or(suite_tests).unwrap_or(cases.len() as u32),
        declared_failures: suite_failures.unwrap_or(failing).max(failing),
        cases,
    })
}

fn add_count(total: Option<u32>, n: u32, attr: &str) -> Result<u32, JunitError> {
    total
        .unwrap_or(0)
        .checked_add(n)
        .ok_or_else(|| JunitError::Malformed(format!("suite `{}` counts overflow", attr)))
}

fn parse_cases(xml: &str) -> Vec<JunitCase> {
    let mut cases = Vec::new();

    for caps in regex!(r"(?s)<testcase\b([^>]*?)(?:/>|>(.*?)</testcase>)").captures_iter(xml) {
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let Some(name) = attribute(attrs, "name") else {
            continue;
        };
        let class_name = attribute(attrs, "classname").unwrap_or_default();
        let failure = caps.get(2).and_then(|body| parse_failure(body.as_str()));

        cases.push(JunitCase {
            class_name,
            name,
            failure,
        });
    }

    cases
}

fn parse_failure(body: &str) -> Option<JunitFailure> {
    let caps = regex!(r"(?s)<(?:failure|error)\b([^>]*?)(?:/>|>(.*?)</(?:failure|error)>)")
        .captures(body)?;

    let from_attr = caps
        .get(1)
        .and_then(|m| attribute(m.as_str(), "message"))
        .map(|m| single_line(&m));
    let from_body = caps
        .get(2)
        .map(|m| single_line(&decode_entities(strip_cdata(m.as_str()))));

    let message = [from_attr, from_body]
        .into_iter()
        .flatten()
        .find(|m| !GENERIC_FAILURE_MESSAGES.contains(&m.to_lowercase().as_str()));

    Some(JunitFailure { message })
}

/// Extract and entity-decode one attribute value.
fn attribute(attrs: &str, key: &str) -> Option<String> {
    regex!(r#"([\w:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .captures_iter(attrs)
        .find(|caps| caps.get(1).map(|m| m.as_str()) == Some(key))
        .and_then(|caps| caps.get(2).or_else(|| caps.get(3)))
        .map(|m| decode_entities(m.as_str()))
}

fn strip_cdata(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}

/// Decode the predefined XML entities and numeric character references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    regex!(r"&(#x[0-9A-Fa-f]+|#[0-9]+|amp|lt|gt|quot|apos);")
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .unwrap_or_else(|| entity[1..].parse::<u32>())
                    .ok()
                    .and_then(char::from_u32),
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Collapse embedded newlines (and the indentation after them) to single spaces.
pub fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
