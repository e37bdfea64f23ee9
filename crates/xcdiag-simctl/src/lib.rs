//! Simulator device resolution and lifecycle operations.
//!
//! All process execution goes through [`CommandRunner`]; [`TokioRunner`]
//! runs real commands and [`mock::MockRunner`] replays scripted ones.

pub mod device;
pub mod lifecycle;
pub mod mock;
pub mod resolve;
pub mod runner;

pub use device::{parse_device_list, DeviceDescriptor, DeviceListError, DeviceState, Platform};
pub use lifecycle::{Diagnostics, LifecycleError, Operation, OperationReport, Outcome, Simulators};
pub use resolve::{select_device, DeviceResolver, ResolveError, SimctlResult};
pub use runner::{args, CommandOutput, CommandRunner, RunnerError, RunnerResult, TokioRunner};
