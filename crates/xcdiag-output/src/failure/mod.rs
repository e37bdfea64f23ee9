//! Failure classification
//!
//! Walks a prioritized chain to turn one failed build/test/run into exactly
//! one [`ClassifiedError`]:
//!
//! 1. compiler diagnostics (located or `❌`-marked error issues) -> `compile`
//! 2. a structured error an inner layer already attached
//! 3. the ordered signature list in [`signatures`]
//! 4. `generic` with the first line of the raw output
//!
//! The chain is not cumulative. Order encodes precedence.

mod signatures;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::is_header;
use crate::record::{Issue, IssueKind};

pub use signatures::signature_names;

/// Category of a classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Compile,
    Scheme,
    Signing,
    Provisioning,
    Dependency,
    Sdk,
    Destination,
    Configuration,
    Generic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Compile => "compile",
            ErrorKind::Scheme => "scheme",
            ErrorKind::Signing => "signing",
            ErrorKind::Provisioning => "provisioning",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Sdk => "sdk",
            ErrorKind::Destination => "destination",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed, user-actionable error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub title: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Compiler diagnostics backing a `compile` classification
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            details: details.into(),
            suggestion: None,
            issues: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues = issues;
        self
    }
}

/// Everything the chain may look at for one failed operation
#[derive(Debug, Clone, Default)]
pub struct FailureContext<'a> {
    /// Raw stdout + stderr (or an error message from the command boundary)
    pub raw_output: &'a str,
    /// Error issues from the output aggregator
    pub issues: &'a [Issue],
    pub platform: Option<&'a str>,
    pub scheme: Option<&'a str>,
    pub configuration: Option<&'a str>,
    /// Error already classified by an inner layer
    pub structured: Option<ClassifiedError>,
}

impl<'a> FailureContext<'a> {
    pub fn new(raw_output: &'a str) -> Self {
        Self {
            raw_output,
            ..Default::default()
        }
    }

    pub fn with_issues(mut self, issues: &'a [Issue]) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_platform(mut self, platform: Option<&'a str>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_scheme(mut self, scheme: Option<&'a str>) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_configuration(mut self, configuration: Option<&'a str>) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_structured(mut self, structured: Option<ClassifiedError>) -> Self {
        self.structured = structured;
        self
    }
}

/// Classify a failure. Always returns exactly one error.
pub fn classify_failure(ctx: &FailureContext<'_>) -> ClassifiedError {
    if let Some(error) = compiler_diagnostics(ctx) {
        debug!(kind = %error.kind, "classified failure from compiler diagnostics");
        return error;
    }

    if let Some(error) = ctx.structured.clone() {
        debug!(kind = %error.kind, "using pre-structured failure");
        return error;
    }

    for signature in signatures::SIGNATURES {
        if let Some(error) = (signature.detect)(ctx.raw_output, ctx) {
            debug!(kind = %error.kind, signature = signature.name, "classified failure from output signature");
            return error;
        }
    }

    generic(ctx.raw_output)
}

fn compiler_diagnostics(ctx: &FailureContext<'_>) -> Option<ClassifiedError> {
    let errors: Vec<Issue> = ctx
        .issues
        .iter()
        .filter(|i| i.kind == IssueKind::Error && (i.has_location() || i.is_marked()))
        .cloned()
        .collect();
    let first = errors.first()?;

    let details = match (errors.len(), first.location()) {
        (1, Some(location)) => format!("{}: {}", location, first.message),
        (1, None) => first.message.clone(),
        (n, Some(location)) => format!("{} compiler errors; first at {}: {}", n, location, first.message),
        (n, None) => format!("{} compiler errors; first: {}", n, first.message),
    };

    Some(
        ClassifiedError::new(ErrorKind::Compile, "Compilation failed", details)
            .with_suggestion("Fix the compiler errors listed below and build again.")
            .with_issues(errors),
    )
}

fn generic(raw_output: &str) -> ClassifiedError {
    let first_line = first_meaningful_line(raw_output)
        .or_else(|| raw_output.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("The command failed without producing any output");
    ClassifiedError::new(ErrorKind::Generic, "Operation failed", first_line)
}

/// First non-empty line outside the invocation banner. Indented lines right
/// after a banner header (the echoed command, settings) belong to it.
fn first_meaningful_line(raw_output: &str) -> Option<&str> {
    let mut in_banner = false;
    for line in raw_output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_header(trimmed) {
            in_banner = true;
            continue;
        }
        if in_banner && line.starts_with(char::is_whitespace) {
            continue;
        }
        return Some(trimmed);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::parse_output;

    fn classify(raw: &str) -> ClassifiedError {
        let parsed = parse_output(raw);
        classify_failure(&FailureContext::new(raw).with_issues(&parsed.errors))
    }

    #[test]
    fn test_compiler_errors_win() {
        let raw = "\
❌ /a.swift:10:5: error: cannot find 'x' in scope
xcodebuild: error: Scheme App is not currently configured for the build action.
** BUILD FAILED **
";
        let error = classify(raw);
        assert_eq!(error.kind, ErrorKind::Compile);
        assert_eq!(error.issues.len(), 1);
        assert!(error.details.contains("/a.swift:10:5"));
    }

    #[test]
    fn test_structured_error_used_when_no_compiler_errors() {
        let structured = ClassifiedError::new(ErrorKind::Destination, "No simulator", "none booted");
        let error = classify_failure(
            &FailureContext::new("xcodebuild: error: something").with_structured(Some(structured.clone())),
        );
        assert_eq!(error, structured);
    }

    #[test]
    fn test_generic_fallback_uses_first_line() {
        let error = classify("\n\n  Segmentation fault: 11\nmore\n");
        assert_eq!(error.kind, ErrorKind::Generic);
        assert_eq!(error.details, "Segmentation fault: 11");
    }

    #[test]
    fn test_marked_error_without_location_is_compile() {
        let raw = "\
Command line invocation:
    /Applications/Xcode.app/Contents/Developer/usr/bin/xcodebuild -scheme App build

❌ Build input file cannot be found: '/src/Gone.swift'
** BUILD FAILED **
";
        let error = classify(raw);
        assert_eq!(error.kind, ErrorKind::Compile);
        assert_eq!(error.details, "Build input file cannot be found: '/src/Gone.swift'");
        assert_eq!(error.issues.len(), 1);
        assert!(error.issues[0].file.is_none());
    }

    #[test]
    fn test_mixed_marked_errors_report_count() {
        let raw = "❌ Build input file cannot be found: '/src/Gone.swift'\n❌ /a.swift:2:1: error: expected '}'\n";
        let error = classify(raw);
        assert_eq!(error.kind, ErrorKind::Compile);
        assert_eq!(error.details, "2 compiler errors; first: Build input file cannot be found: '/src/Gone.swift'");
    }

    #[test]
    fn test_generic_fallback_skips_invocation_banner() {
        let raw = "\
Command line invocation:
    /Applications/Xcode.app/Contents/Developer/usr/bin/xcodebuild -scheme App build

User defaults from command line:
    IDEPackageSupportUseBuiltinSCM = YES

Killed: 9
";
        let error = classify(raw);
        assert_eq!(error.kind, ErrorKind::Generic);
        assert_eq!(error.details, "Killed: 9");
    }

    #[test]
    fn test_generic_fallback_banner_only() {
        let error = classify("Command line invocation:\n");
        assert_eq!(error.kind, ErrorKind::Generic);
        assert_eq!(error.details, "Command line invocation:");
    }

    #[test]
    fn test_generic_fallback_on_empty_output() {
        let error = classify("");
        assert_eq!(error.kind, ErrorKind::Generic);
        assert!(!error.details.is_empty());
    }

    #[test]
    fn test_scheme_not_found() {
        let error = classify("xcodebuild: error: The project named \"App\" does not contain a scheme named \"Missing\". The \"-list\" option can be used to find the names of the schemes in the project.");
        assert_eq!(error.kind, ErrorKind::Scheme);
        assert!(error.details.contains("Missing"));
        assert!(error.suggestion.is_some());
    }

    #[test]
    fn test_sdk_inside_destination_block_is_sdk() {
        let raw = "\
xcodebuild: error: Unable to find a destination matching the provided destination specifier:
\t\t{ platform:iOS Simulator, OS:18.4, name:iPhone 16 }

\tIneligible destinations for the \"App\" scheme:
\t\t{ platform:iOS, id:dvtdevice-DVTiPhonePlaceholder-iphoneos:placeholder, name:Any iOS Device, error:iOS 18.4 is not installed. To use with Xcode, first download and install the platform }
";
        let error = classify(raw);
        assert_eq!(error.kind, ErrorKind::Sdk);
        assert!(error.details.contains("iOS 18.4"));
    }

    #[test]
    fn test_plain_destination_not_found() {
        let raw = "\
xcodebuild: error: Unable to find a destination matching the provided destination specifier:
\t\t{ platform:iOS Simulator, OS:17.0, name:iPhone 99 }
";
        let error = classify(raw);
        assert_eq!(error.kind, ErrorKind::Destination);
        assert!(error.details.contains("iPhone 99"));
    }

    #[test]
    fn test_only_one_error_even_when_many_signatures_match() {
        let raw = "\
error: no such module 'Alamofire'
Code Signing Error: Signing for \"App\" requires a development team.
xcodebuild: error: Failed to build.
";
        // no located errors; code signing precedes missing-module in the chain
        let error = classify(raw);
        assert_eq!(error.kind, ErrorKind::Signing);
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::Provisioning).unwrap();
        assert_eq!(json, "\"provisioning\"");
    }
}
