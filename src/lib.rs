//! xcdiag
//!
//! Turns raw `xcodebuild` / `swift test` output and XUnit reports into
//! structured issues, test results and classified failures, and drives
//! simulator boot, shutdown and install with typed outcomes.
//!
//! The parsing engine lives in [`xcdiag_output`] and the simulator layer in
//! [`xcdiag_simctl`]; this crate adds configuration, rendering, operation
//! logs and the build/test pipelines used by the `xcdiag` binary.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod sink;

pub use xcdiag_output;
pub use xcdiag_simctl;

pub use config::{EffectiveConfig, Settings};
pub use pipeline::{BuildReport, BuildRequest, Pipeline, PipelineError, TestReport};
pub use sink::{OperationLog, SinkError};
