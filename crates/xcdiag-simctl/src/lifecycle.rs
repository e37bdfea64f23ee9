//! Simulator lifecycle outcome machines
//!
//! Boot, shutdown and install each resolve a device fresh, decide from its
//! current state, run at most the commands that state requires, and return
//! one immutable [`OperationReport`]. Success and failure paths carry the
//! same diagnostics shape.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::device::{DeviceDescriptor, DeviceState, Platform};
use crate::resolve::{DeviceResolver, ResolveError};
use crate::runner::{args, CommandOutput, CommandRunner, RunnerError};

/// Typed failure causes
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleError {
    #[error("no simulator matches {}", identifier.as_deref().unwrap_or("a booted device"))]
    SimulatorNotFound { identifier: Option<String> },

    #[error("{count} simulators are booted; pass a simulator id to choose one")]
    MultipleBooted { count: usize },

    #[error("simulator is busy ({current_state}); try again once the transition finishes")]
    SimulatorBusy { current_state: DeviceState },

    #[error("failed to list simulators: {message}")]
    ListFailed { message: String },

    #[error("boot failed: {stderr}")]
    BootFailed { stderr: String },

    #[error("shutdown failed: {stderr}")]
    ShutdownFailed { stderr: String },

    #[error("install failed: {stderr}")]
    InstallFailed { stderr: String },

    #[error("app bundle not found: {path}")]
    AppBundleMissing { path: String },
}

impl From<ResolveError> for LifecycleError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound { identifier } => LifecycleError::SimulatorNotFound { identifier },
            ResolveError::MultipleBooted { count } => LifecycleError::MultipleBooted { count },
            ResolveError::ListFailed { message } => LifecycleError::ListFailed { message },
        }
    }
}

/// Which machine produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Boot,
    Shutdown,
    Install,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Boot => "boot",
            Operation::Shutdown => "shutdown",
            Operation::Install => "install",
        }
    }
}

/// Tagged result of one lifecycle operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    AlreadyBooted,
    AlreadyShutdown,
    Failed(LifecycleError),
}

impl Outcome {
    /// Anything but `Failed`
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    pub fn error(&self) -> Option<&LifecycleError> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Diagnostics snapshot, populated identically on every path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub platform: Option<Platform>,
    pub runtime_identifier: Option<String>,
    pub state_before: Option<DeviceState>,
    pub app_path: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<LifecycleError>,
}

/// Final, immutable report of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    operation: Operation,
    outcome: Outcome,
    diagnostics: Diagnostics,
}

impl OperationReport {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Short human label: the state reached, or the failure
    pub fn label(&self) -> String {
        match (&self.outcome, self.operation) {
            (Outcome::Succeeded, Operation::Boot) | (Outcome::AlreadyBooted, _) => "Booted".to_string(),
            (Outcome::Succeeded, Operation::Shutdown) | (Outcome::AlreadyShutdown, _) => "Shutdown".to_string(),
            (Outcome::Succeeded, Operation::Install) => "Installed".to_string(),
            (Outcome::Failed(e), _) => format!("Failed: {}", e),
        }
    }
}

/// Collects diagnostics while a machine runs; consumed by `finish`.
struct ReportBuilder {
    operation: Operation,
    started_at: DateTime<Utc>,
    device: Option<DeviceDescriptor>,
    app_path: Option<String>,
}

impl ReportBuilder {
    fn start(operation: Operation) -> Self {
        Self {
            operation,
            started_at: Utc::now(),
            device: None,
            app_path: None,
        }
    }

    fn finish(self, outcome: Outcome) -> OperationReport {
        let device = self.device.as_ref();
        let diagnostics = Diagnostics {
            device_id: device.map(|d| d.id.clone()),
            device_name: device.map(|d| d.name.clone()),
            platform: device.map(|d| d.platform),
            runtime_identifier: device.map(|d| d.runtime_identifier.clone()),
            state_before: device.map(|d| d.state),
            app_path: self.app_path,
            started_at: self.started_at,
            finished_at: Utc::now(),
            error: outcome.error().cloned(),
        };

        match &outcome {
            Outcome::Failed(e) => warn!(operation = self.operation.as_str(), error = %e, "simulator operation failed"),
            other => info!(operation = self.operation.as_str(), outcome = ?other, "simulator operation finished"),
        }

        OperationReport {
            operation: self.operation,
            outcome,
            diagnostics,
        }
    }
}

/// stderr fragment simctl prints when the device is already in `state`
fn already_in_state(output: &CommandOutput, state: DeviceState) -> bool {
    output
        .stderr
        .contains(&format!("current state: {}", state.as_str()))
}

fn command_error(err: RunnerError) -> String {
    err.to_string()
}

/// Lifecycle operations against simctl
pub struct Simulators<'a> {
    runner: &'a dyn CommandRunner,
    xcrun: String,
}

impl<'a> Simulators<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            xcrun: "xcrun".to_string(),
        }
    }

    /// Use a different `xcrun` executable.
    pub fn with_xcrun(mut self, xcrun: impl Into<String>) -> Self {
        self.xcrun = xcrun.into();
        self
    }

    pub fn resolver(&self) -> DeviceResolver<'a> {
        DeviceResolver::new(self.runner).with_xcrun(self.xcrun.clone())
    }

    /// Boot the identified (or single booted) simulator.
    pub async fn boot(&self, identifier: Option<&str>) -> OperationReport {
        let mut report = ReportBuilder::start(Operation::Boot);

        let device = match self.resolver().resolve(identifier).await {
            Ok(device) => device,
            Err(e) => return report.finish(Outcome::Failed(e.into())),
        };
        report.device = Some(device.clone());

        let outcome = match self.boot_device(&device).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(e),
        };
        report.finish(outcome)
    }

    /// Shut down the identified (or single booted) simulator.
    pub async fn shutdown(&self, identifier: Option<&str>) -> OperationReport {
        let mut report = ReportBuilder::start(Operation::Shutdown);

        let device = match self.resolver().resolve(identifier).await {
            Ok(device) => device,
            Err(e) => return report.finish(Outcome::Failed(e.into())),
        };
        report.device = Some(device.clone());

        let outcome = match device.state {
            DeviceState::Shutdown | DeviceState::ShuttingDown => {
                info!(id = %device.id, state = %device.state, "simulator already shut down");
                Outcome::AlreadyShutdown
            }
            DeviceState::Booted | DeviceState::Booting => {
                match self.simctl(["shutdown", device.id.as_str()]).await {
                    Ok(out) if out.success() => Outcome::Succeeded,
                    Ok(out) if already_in_state(&out, DeviceState::Shutdown) => Outcome::AlreadyShutdown,
                    Ok(out) => Outcome::Failed(LifecycleError::ShutdownFailed {
                        stderr: out.stderr.trim().to_string(),
                    }),
                    Err(e) => Outcome::Failed(LifecycleError::ShutdownFailed {
                        stderr: command_error(e),
                    }),
                }
            }
        };
        report.finish(outcome)
    }

    /// Install an app bundle, booting the device first when needed.
    pub async fn install(&self, app_path: &Path, identifier: Option<&str>) -> OperationReport {
        let mut report = ReportBuilder::start(Operation::Install);
        report.app_path = Some(app_path.display().to_string());

        let device = match self.resolver().resolve(identifier).await {
            Ok(device) => device,
            Err(e) => return report.finish(Outcome::Failed(e.into())),
        };
        report.device = Some(device.clone());

        if !app_path.exists() {
            return report.finish(Outcome::Failed(LifecycleError::AppBundleMissing {
                path: app_path.display().to_string(),
            }));
        }

        if !device.is_booted() {
            info!(id = %device.id, state = %device.state, "booting simulator before install");
            if let Err(e) = self.boot_device(&device).await {
                return report.finish(Outcome::Failed(e));
            }
        }

        let app = app_path.display().to_string();
        let outcome = match self.simctl(["install", device.id.as_str(), app.as_str()]).await {
            Ok(out) if out.success() => Outcome::Succeeded,
            Ok(out) => Outcome::Failed(LifecycleError::InstallFailed { stderr: out.stderr }),
            Err(e) => Outcome::Failed(LifecycleError::InstallFailed {
                stderr: command_error(e),
            }),
        };
        report.finish(outcome)
    }

    /// Boot decision for an already-resolved device.
    async fn boot_device(&self, device: &DeviceDescriptor) -> Result<Outcome, LifecycleError> {
        match device.state {
            DeviceState::Booted => {
                info!(id = %device.id, "simulator already booted");
                Ok(Outcome::AlreadyBooted)
            }
            DeviceState::ShuttingDown => Err(LifecycleError::SimulatorBusy {
                current_state: device.state,
            }),
            DeviceState::Shutdown | DeviceState::Booting => {
                let out = self
                    .simctl(["boot", device.id.as_str()])
                    .await
                    .map_err(|e| LifecycleError::BootFailed {
                        stderr: command_error(e),
                    })?;
                if out.success() {
                    Ok(Outcome::Succeeded)
                } else if already_in_state(&out, DeviceState::Booted) {
                    Ok(Outcome::AlreadyBooted)
                } else {
                    Err(LifecycleError::BootFailed {
                        stderr: out.stderr.trim().to_string(),
                    })
                }
            }
        }
    }

    async fn simctl<const N: usize>(&self, sub: [&str; N]) -> Result<CommandOutput, RunnerError> {
        let mut argv = args(["simctl"]);
        argv.extend(args(sub));
        self.runner.run(&self.xcrun, &argv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;

    const BOOTED_ID: &str = "11111111-1111-1111-1111-111111111111";
    const SHUTDOWN_ID: &str = "22222222-2222-2222-2222-222222222222";
    const SHUTTING_DOWN_ID: &str = "33333333-3333-3333-3333-333333333333";

    fn device_list(entries: &[(&str, &str, &str)]) -> String {
        let devices: Vec<String> = entries
            .iter()
            .map(|(id, name, state)| {
                format!(
                    r#"{{"udid": "{}", "name": "{}", "state": "{}", "isAvailable": true}}"#,
                    id, name, state
                )
            })
            .collect();
        format!(
            r#"{{"devices": {{"com.apple.CoreSimulator.SimRuntime.iOS-17-2": [{}]}}}}"#,
            devices.join(",")
        )
    }

    fn standard_list() -> String {
        device_list(&[
            (BOOTED_ID, "iPhone 15", "Booted"),
            (SHUTDOWN_ID, "iPhone 15 Pro", "Shutdown"),
            (SHUTTING_DOWN_ID, "iPad Air", "Shutting Down"),
        ])
    }

    #[tokio::test]
    async fn test_boot_shutdown_device_runs_boot() {
        let runner = MockRunner::new();
        runner.succeed(standard_list()).succeed("");

        let report = Simulators::new(&runner).boot(Some(SHUTDOWN_ID)).await;
        assert_eq!(report.outcome(), &Outcome::Succeeded);
        assert_eq!(report.label(), "Booted");
        assert_eq!(report.diagnostics().device_id.as_deref(), Some(SHUTDOWN_ID));
        assert_eq!(report.diagnostics().state_before, Some(DeviceState::Shutdown));
        assert_eq!(
            runner.command_lines()[1],
            format!("xcrun simctl boot {}", SHUTDOWN_ID)
        );
    }

    #[tokio::test]
    async fn test_boot_already_booted_runs_no_command() {
        let runner = MockRunner::new();
        runner.succeed(standard_list());

        let report = Simulators::new(&runner).boot(Some(BOOTED_ID)).await;
        assert_eq!(report.outcome(), &Outcome::AlreadyBooted);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_boot_shutting_down_is_busy() {
        let runner = MockRunner::new();
        runner.succeed(standard_list());

        let report = Simulators::new(&runner).boot(Some("iPad Air")).await;
        assert_eq!(
            report.outcome(),
            &Outcome::Failed(LifecycleError::SimulatorBusy {
                current_state: DeviceState::ShuttingDown
            })
        );
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(report.diagnostics().device_name.as_deref(), Some("iPad Air"));
    }

    #[tokio::test]
    async fn test_boot_race_absorbed_as_already_booted() {
        let runner = MockRunner::new();
        runner.succeed(standard_list()).fail(
            149,
            "",
            "An error was encountered processing the command (domain=com.apple.CoreSimulator.SimError, code=405):\nUnable to boot device in current state: Booted\n",
        );

        let report = Simulators::new(&runner).boot(Some(SHUTDOWN_ID)).await;
        assert_eq!(report.outcome(), &Outcome::AlreadyBooted);
    }

    #[tokio::test]
    async fn test_boot_not_found_runs_no_command() {
        let runner = MockRunner::new();
        runner.succeed(standard_list());

        let report = Simulators::new(&runner).boot(Some("iPhone 99")).await;
        assert!(matches!(
            report.outcome(),
            Outcome::Failed(LifecycleError::SimulatorNotFound { .. })
        ));
        assert_eq!(report.diagnostics().device_id, None);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_boot_list_failure() {
        let runner = MockRunner::new();
        runner.fail(1, "", "xcrun: error: unable to find utility \"simctl\"");

        let report = Simulators::new(&runner).boot(None).await;
        assert!(matches!(
            report.outcome(),
            Outcome::Failed(LifecycleError::ListFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_transitions() {
        let runner = MockRunner::new();
        runner.succeed(standard_list()).succeed("");
        let report = Simulators::new(&runner).shutdown(None).await;
        assert_eq!(report.outcome(), &Outcome::Succeeded);
        assert_eq!(report.label(), "Shutdown");
        assert_eq!(
            runner.command_lines()[1],
            format!("xcrun simctl shutdown {}", BOOTED_ID)
        );

        let runner = MockRunner::new();
        runner.succeed(standard_list());
        let report = Simulators::new(&runner).shutdown(Some(SHUTTING_DOWN_ID)).await;
        assert_eq!(report.outcome(), &Outcome::AlreadyShutdown);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_failure_carries_stderr() {
        let runner = MockRunner::new();
        runner.succeed(standard_list()).fail(1, "", "simctl exploded\n");
        let report = Simulators::new(&runner).shutdown(Some(BOOTED_ID)).await;
        assert_eq!(
            report.outcome(),
            &Outcome::Failed(LifecycleError::ShutdownFailed {
                stderr: "simctl exploded".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_install_without_booted_device_has_no_identity() {
        let runner = MockRunner::new();
        runner.succeed(device_list(&[(SHUTDOWN_ID, "iPhone 15", "Shutdown")]));
        let app = tempfile::tempdir().unwrap();

        let report = Simulators::new(&runner).install(app.path(), None).await;
        assert_eq!(
            report.outcome(),
            &Outcome::Failed(LifecycleError::SimulatorNotFound { identifier: None })
        );
        let d = report.diagnostics();
        assert_eq!(d.device_id, None);
        assert_eq!(d.device_name, None);
        assert_eq!(d.platform, None);
        assert_eq!(d.error, report.outcome().error().cloned());
    }

    #[tokio::test]
    async fn test_install_boots_first_when_needed() {
        let runner = MockRunner::new();
        runner.succeed(standard_list()).succeed("").succeed("");
        let app = tempfile::tempdir().unwrap();

        let report = Simulators::new(&runner)
            .install(app.path(), Some(SHUTDOWN_ID))
            .await;
        assert_eq!(report.outcome(), &Outcome::Succeeded);
        let lines = runner.command_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(&format!("simctl boot {}", SHUTDOWN_ID)));
        assert!(lines[2].starts_with(&format!("xcrun simctl install {}", SHUTDOWN_ID)));
    }

    #[tokio::test]
    async fn test_install_failure_keeps_stderr_verbatim() {
        let runner = MockRunner::new();
        let stderr = "An error was encountered processing the command (domain=IXUserPresentableErrorDomain, code=1):\nThis app could not be installed at this time.\n";
        runner.succeed(standard_list()).fail(1, "", stderr);
        let app = tempfile::tempdir().unwrap();

        let report = Simulators::new(&runner).install(app.path(), None).await;
        assert_eq!(
            report.outcome(),
            &Outcome::Failed(LifecycleError::InstallFailed {
                stderr: stderr.to_string()
            })
        );
        assert_eq!(report.diagnostics().device_id.as_deref(), Some(BOOTED_ID));
    }

    #[tokio::test]
    async fn test_install_missing_bundle() {
        let runner = MockRunner::new();
        runner.succeed(standard_list());

        let report = Simulators::new(&runner)
            .install(Path::new("/nonexistent/App.app"), None)
            .await;
        assert!(matches!(
            report.outcome(),
            Outcome::Failed(LifecycleError::AppBundleMissing { .. })
        ));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_report_serializes_with_same_shape() {
        let runner = MockRunner::new();
        runner.succeed(standard_list());
        let ok = Simulators::new(&runner).boot(Some(BOOTED_ID)).await;

        let runner = MockRunner::new();
        runner.succeed(standard_list());
        let failed = Simulators::new(&runner).boot(Some("nope")).await;

        let ok = serde_json::to_value(&ok).unwrap();
        let failed = serde_json::to_value(&failed).unwrap();
        let keys = |v: &serde_json::Value| {
            v["diagnostics"]
                .as_object()
                .unwrap()
                .keys()
                .cloned()
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&ok), keys(&failed));
        assert_eq!(ok["outcome"]["status"], "already_booted");
        assert_eq!(failed["outcome"]["status"], "failed");
        assert_eq!(failed["outcome"]["error"]["type"], "simulator_not_found");
    }
}
