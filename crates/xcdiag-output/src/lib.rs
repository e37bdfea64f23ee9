//! Parsers and classifiers for Apple toolchain output.
//!
//! Everything in this crate is a pure function of text (plus, for
//! [`reconcile`], the XML report files it is handed): line classification,
//! whole-output aggregation, test report reconciliation, and the failure
//! classifier chain. No process is spawned here.

/// Compile a built-in pattern once and hand out a `&'static Regex`.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<regex_lite::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex_lite::Regex::new($re).expect("invalid built-in pattern"))
    }};
}

mod aggregate;
mod failure;
pub mod junit;
mod line;
mod reconcile;
mod record;

pub use aggregate::{parse_output, ParsedOutput};
pub use failure::{classify_failure, signature_names, ClassifiedError, ErrorKind, FailureContext};
pub use line::{classify_line, strip_styling};
pub use reconcile::{
    console_failure_reason, reconcile, report_paths_for, FailingTest, ReconciledTests,
    ReportCleanup, TestSource, DEFAULT_CONTINUATION_WINDOW,
};
pub use record::{Issue, IssueKind, LineRecord, TestRecord};
