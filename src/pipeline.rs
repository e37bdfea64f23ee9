//! Build and test pipelines
//!
//! Each pipeline runs one toolchain command through a [`CommandRunner`],
//! aggregates its output, reconciles test results where applicable, and
//! classifies the failure when the command did not succeed:
//!
//! ```text
//! command -> parse_output -> reconcile -> classify_failure -> report
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use xcdiag_output::{
    classify_failure, parse_output, reconcile, report_paths_for, ClassifiedError, FailureContext,
    ParsedOutput, ReconciledTests,
};
use xcdiag_simctl::{CommandRunner, RunnerError};

use crate::config::Settings;

/// Pipeline errors
///
/// Only failures to run the toolchain at all end up here. A command that
/// runs and fails (or times out) produces a report with a classified error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not run {program}: {message}")]
    Launch { program: String, message: String },

    #[error("could not prepare report directory {path}: {source}")]
    ReportDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// What to build or test with xcodebuild
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub workspace: Option<PathBuf>,
    pub project: Option<PathBuf>,
    pub scheme: String,
    pub configuration: Option<String>,
    /// Raw `-destination` value, e.g. `platform=iOS Simulator,name=iPhone 15`
    pub destination: Option<String>,
    /// Platform name used in failure suggestions
    pub platform: Option<String>,
}

impl BuildRequest {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            ..Default::default()
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<PathBuf>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = Some(configuration.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// xcodebuild arguments for `action` (`build` or `test`)
    pub fn xcodebuild_args(&self, action: &str) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(workspace) = &self.workspace {
            argv.push("-workspace".to_string());
            argv.push(workspace.display().to_string());
        } else if let Some(project) = &self.project {
            argv.push("-project".to_string());
            argv.push(project.display().to_string());
        }
        argv.push("-scheme".to_string());
        argv.push(self.scheme.clone());
        if let Some(configuration) = &self.configuration {
            argv.push("-configuration".to_string());
            argv.push(configuration.clone());
        }
        if let Some(destination) = &self.destination {
            argv.push("-destination".to_string());
            argv.push(destination.clone());
        }
        argv.push(action.to_string());
        argv
    }

    fn failure_context<'a>(&'a self, raw: &'a str, parsed: &'a ParsedOutput) -> FailureContext<'a> {
        FailureContext::new(raw)
            .with_issues(&parsed.errors)
            .with_platform(self.platform.as_deref())
            .with_scheme(Some(self.scheme.as_str()))
            .with_configuration(self.configuration.as_deref())
    }
}

/// Result of a build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub command: Vec<String>,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub output: ParsedOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

/// Result of a test run
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub command: Vec<String>,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub output: ParsedOutput,
    pub tests: ReconciledTests,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

/// What came back from one toolchain command
struct Invocation {
    command: Vec<String>,
    exit_code: Option<i32>,
    console: String,
    /// Set when the command was cut short (timeout) rather than exiting
    interrupted: Option<String>,
}

impl Invocation {
    fn exited_cleanly(&self) -> bool {
        self.interrupted.is_none() && self.exit_code == Some(0)
    }

    /// Text the failure chain looks at
    fn failure_text(&self) -> String {
        match &self.interrupted {
            Some(reason) if self.console.trim().is_empty() => reason.clone(),
            Some(reason) => format!("{}\n{}", reason, self.console),
            None => self.console.clone(),
        }
    }
}

/// Runs build and test commands with the configured toolchain
pub struct Pipeline<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a Settings,
    report_root: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &'a Settings) -> Self {
        Self {
            runner,
            settings,
            report_root: std::env::temp_dir(),
        }
    }

    /// Directory under which per-run report directories are created.
    pub fn with_report_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.report_root = root.into();
        self
    }

    /// `xcodebuild ... build`
    pub async fn build(&self, request: &BuildRequest) -> PipelineResult<BuildReport> {
        let invocation = self
            .invoke(&self.settings.toolchain.xcodebuild, request.xcodebuild_args("build"))
            .await?;
        let output = parse_output(&invocation.console);

        let succeeded = invocation.exited_cleanly();
        let error = if succeeded {
            None
        } else {
            let raw = invocation.failure_text();
            Some(classify_failure(&request.failure_context(&raw, &output)))
        };

        info!(scheme = %request.scheme, succeeded, "build finished");
        Ok(BuildReport {
            command: invocation.command,
            exit_code: invocation.exit_code,
            succeeded,
            output,
            error,
        })
    }

    /// `xcodebuild ... test`; results come from the console.
    pub async fn test(&self, request: &BuildRequest) -> PipelineResult<TestReport> {
        let invocation = self
            .invoke(&self.settings.toolchain.xcodebuild, request.xcodebuild_args("test"))
            .await?;
        let output = parse_output(&invocation.console);
        let tests = reconcile(&[], &invocation.console, &output, self.settings.continuation_window);

        let report = finish_test(invocation, output, tests, |raw, output| {
            classify_failure(&request.failure_context(raw, output))
        });
        info!(scheme = %request.scheme, succeeded = report.succeeded, "test run finished");
        Ok(report)
    }

    /// `swift test` for a package, reading its XUnit reports.
    pub async fn swift_package_test(&self, package_path: &Path) -> PipelineResult<TestReport> {
        let report_dir = self.report_root.join(format!("xcdiag-{}", Uuid::new_v4()));
        fs::create_dir_all(&report_dir).map_err(|source| PipelineError::ReportDir {
            path: report_dir.clone(),
            source,
        })?;
        let base = report_dir.join("results.xml");

        let argv = vec![
            "test".to_string(),
            "--package-path".to_string(),
            package_path.display().to_string(),
            "--xunit-output".to_string(),
            base.display().to_string(),
        ];
        let invocation = self.invoke(&self.settings.toolchain.swift, argv).await;

        let result = invocation.map(|invocation| {
            let output = parse_output(&invocation.console);
            let tests = reconcile(
                &report_paths_for(&base),
                &invocation.console,
                &output,
                self.settings.continuation_window,
            );
            finish_test(invocation, output, tests, |raw, output| {
                classify_failure(&FailureContext::new(raw).with_issues(&output.errors))
            })
        });

        if let Err(e) = fs::remove_dir(&report_dir) {
            warn!(path = %report_dir.display(), error = %e, "failed to remove report directory");
        }

        let report = result?;
        info!(package = %package_path.display(), succeeded = report.succeeded, "swift test finished");
        Ok(report)
    }

    async fn invoke(&self, program: &str, argv: Vec<String>) -> PipelineResult<Invocation> {
        let mut command = vec![program.to_string()];
        command.extend(argv.iter().cloned());
        debug!(command = %command.join(" "), "running toolchain command");

        match self.runner.run(program, &argv).await {
            Ok(out) => Ok(Invocation {
                command,
                exit_code: out.code,
                console: out.combined(),
                interrupted: None,
            }),
            Err(e @ RunnerError::TimedOut { .. }) => {
                warn!(program, error = %e, "toolchain command timed out");
                Ok(Invocation {
                    command,
                    exit_code: None,
                    console: String::new(),
                    interrupted: Some(e.to_string()),
                })
            }
            Err(e) => Err(PipelineError::Launch {
                program: program.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Test runs fail when the command fails or any test failed. A failure that
/// the failing tests already explain is not classified again.
fn finish_test<F>(invocation: Invocation, output: ParsedOutput, tests: ReconciledTests, classify: F) -> TestReport
where
    F: FnOnce(&str, &ParsedOutput) -> ClassifiedError,
{
    let exited_cleanly = invocation.exited_cleanly();
    let succeeded = exited_cleanly && tests.succeeded();

    let explained_by_tests = tests.failed > 0 && output.build_succeeded && invocation.interrupted.is_none();
    let error = if exited_cleanly || explained_by_tests {
        None
    } else {
        Some(classify(&invocation.failure_text(), &output))
    };

    TestReport {
        command: invocation.command,
        exit_code: invocation.exit_code,
        succeeded,
        output,
        tests,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcdiag_output::{ErrorKind, TestSource};
    use xcdiag_simctl::mock::{MockResponse, MockRunner};

    fn request() -> BuildRequest {
        BuildRequest::new("MyApp")
            .with_workspace("MyApp.xcworkspace")
            .with_configuration("Debug")
            .with_destination("platform=iOS Simulator,name=iPhone 15")
            .with_platform("iOS")
    }

    #[test]
    fn test_xcodebuild_args() {
        assert_eq!(
            request().xcodebuild_args("build"),
            vec![
                "-workspace",
                "MyApp.xcworkspace",
                "-scheme",
                "MyApp",
                "-configuration",
                "Debug",
                "-destination",
                "platform=iOS Simulator,name=iPhone 15",
                "build",
            ]
        );
    }

    #[test]
    fn test_workspace_wins_over_project() {
        let argv = BuildRequest::new("App")
            .with_project("App.xcodeproj")
            .with_workspace("App.xcworkspace")
            .xcodebuild_args("test");
        assert!(argv.contains(&"-workspace".to_string()));
        assert!(!argv.contains(&"-project".to_string()));
        assert_eq!(argv.last().map(String::as_str), Some("test"));
    }

    #[tokio::test]
    async fn test_build_success() {
        let runner = MockRunner::new();
        runner.succeed("** BUILD SUCCEEDED **\n");
        let settings = Settings::default();

        let report = Pipeline::new(&runner, &settings).build(&request()).await.unwrap();
        assert!(report.succeeded);
        assert!(report.error.is_none());
        assert_eq!(report.command[0], "xcodebuild");
        assert_eq!(runner.calls()[0].program, "xcodebuild");
    }

    #[tokio::test]
    async fn test_build_failure_is_classified() {
        let runner = MockRunner::new();
        runner.fail(65, "/src/App.swift:3:5: error: cannot find 'x' in scope\n** BUILD FAILED **\n", "");
        let settings = Settings::default();

        let report = Pipeline::new(&runner, &settings).build(&request()).await.unwrap();
        assert!(!report.succeeded);
        assert_eq!(report.exit_code, Some(65));
        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Compile);
        assert_eq!(error.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_a_generic_failure() {
        let runner = MockRunner::new();
        runner.push(MockResponse::TimedOut(60));
        let settings = Settings::default();

        let report = Pipeline::new(&runner, &settings).build(&request()).await.unwrap();
        assert!(!report.succeeded);
        assert_eq!(report.exit_code, None);
        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Generic);
        assert!(error.details.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_an_error() {
        let runner = MockRunner::new();
        runner.push(MockResponse::SpawnFailure("No such file or directory".to_string()));
        let settings = Settings::default();

        let result = Pipeline::new(&runner, &settings).build(&request()).await;
        assert!(matches!(result, Err(PipelineError::Launch { .. })));
    }

    #[tokio::test]
    async fn test_failing_tests_are_not_reclassified() {
        let runner = MockRunner::new();
        runner.fail(
            65,
            "Test Case '-[AppTests.LoginTests testEmpty]' started.\n\
             /src/LoginTests.swift:9: error: -[AppTests.LoginTests testEmpty] : XCTAssertTrue failed\n\
             Test Case '-[AppTests.LoginTests testEmpty]' failed (0.002 seconds).\n\
             Executed 1 test, with 1 failure (0 unexpected) in 0.002 (0.003) seconds\n\
             ** TEST FAILED **\n",
            "",
        );
        let settings = Settings::default();

        let report = Pipeline::new(&runner, &settings).test(&request()).await.unwrap();
        assert!(!report.succeeded);
        assert_eq!(report.tests.failed, 1);
        assert_eq!(report.tests.source, TestSource::Console);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_test_build_failure_is_classified() {
        let runner = MockRunner::new();
        runner.fail(
            65,
            "",
            "xcodebuild: error: Scheme MyApp is not currently configured for the test action.\n",
        );
        let settings = Settings::default();

        let report = Pipeline::new(&runner, &settings).test(&request()).await.unwrap();
        assert!(!report.succeeded);
        assert!(report.error.is_some());
    }
}
