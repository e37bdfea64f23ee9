//! Device resolution
//!
//! Turns an optional user-supplied identifier (UUID or name) into exactly one
//! device, deterministically. The device list is fetched fresh for every
//! call; device state belongs to the simulator daemon, not to this process.

use std::cmp::{Ordering, Reverse};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::device::{compare_versions, parse_device_list, DeviceDescriptor, DeviceState};
use crate::runner::{args, CommandRunner};

/// Resolution failures. These are expected outcomes, not faults.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolveError {
    #[error("no simulator matches {}", identifier.as_deref().unwrap_or("a booted device"))]
    NotFound { identifier: Option<String> },

    #[error("{count} simulators are booted; pass a simulator id to choose one")]
    MultipleBooted { count: usize },

    #[error("failed to list simulators: {message}")]
    ListFailed { message: String },
}

pub type SimctlResult<T> = Result<T, ResolveError>;

/// Resolves identifiers against the live simctl device list
pub struct DeviceResolver<'a> {
    runner: &'a dyn CommandRunner,
    xcrun: String,
}

impl<'a> DeviceResolver<'a> {
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

    /// List all devices (`xcrun simctl list devices --json`).
    pub async fn list_devices(&self) -> SimctlResult<Vec<DeviceDescriptor>> {
        let output = self
            .runner
            .run(&self.xcrun, &args(["simctl", "list", "devices", "--json"]))
            .await
            .map_err(|e| ResolveError::ListFailed {
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(ResolveError::ListFailed {
                message: format!("simctl list failed: {}", output.stderr.trim()),
            });
        }

        let devices = parse_device_list(&output.stdout).map_err(|e| ResolveError::ListFailed {
            message: e.to_string(),
        })?;
        debug!(count = devices.len(), "listed simulators");
        Ok(devices)
    }

    /// Resolve `identifier` (or the single booted device) to one device.
    pub async fn resolve(&self, identifier: Option<&str>) -> SimctlResult<DeviceDescriptor> {
        let devices = self.list_devices().await?;
        let device = select_device(&devices, identifier)?;
        info!(
            id = %device.id,
            name = %device.name,
            state = %device.state,
            "resolved simulator"
        );
        Ok(device)
    }
}

/// Whether `identifier` is a canonical hyphenated UUID.
pub fn is_uuid(identifier: &str) -> bool {
    identifier.len() == 36 && Uuid::parse_str(identifier).is_ok()
}

/// Pick one device from an already-fetched list.
///
/// - UUID-shaped identifier: match by id only, case-insensitively.
/// - Other identifier: match id or name; ties go to available devices, then
///   booted ones, then the newest runtime, then the lowest id.
/// - No identifier: the single booted, available device.
pub fn select_device(
    devices: &[DeviceDescriptor],
    identifier: Option<&str>,
) -> SimctlResult<DeviceDescriptor> {
    let Some(identifier) = identifier.map(str::trim).filter(|s| !s.is_empty()) else {
        return single_booted(devices);
    };

    if is_uuid(identifier) {
        return devices
            .iter()
            .find(|d| d.id.eq_ignore_ascii_case(identifier))
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                identifier: Some(identifier.to_string()),
            });
    }

    let mut candidates: Vec<&DeviceDescriptor> = devices
        .iter()
        .filter(|d| d.id == identifier || d.name == identifier)
        .collect();

    if candidates.len() > 1 {
        debug!(identifier, count = candidates.len(), "breaking tie between simulators");
    }
    candidates.sort_by(|a, b| tie_break(a, b));

    candidates
        .first()
        .map(|d| (*d).clone())
        .ok_or_else(|| ResolveError::NotFound {
            identifier: Some(identifier.to_string()),
        })
}

fn single_booted(devices: &[DeviceDescriptor]) -> SimctlResult<DeviceDescriptor> {
    let booted: Vec<&DeviceDescriptor> = devices
        .iter()
        .filter(|d| d.state == DeviceState::Booted && d.available)
        .collect();

    match booted.as_slice() {
        [] => Err(ResolveError::NotFound { identifier: None }),
        [device] => Ok((*device).clone()),
        many => Err(ResolveError::MultipleBooted { count: many.len() }),
    }
}

/// Total order over candidates sharing an identifier; the preferred device
/// sorts first.
fn tie_break(a: &DeviceDescriptor, b: &DeviceDescriptor) -> Ordering {
    Reverse(a.available)
        .cmp(&Reverse(b.available))
        .then_with(|| Reverse(a.is_booted()).cmp(&Reverse(b.is_booted())))
        .then_with(|| compare_versions(&b.runtime_version(), &a.runtime_version()))
        .then_with(|| a.id.cmp(&b.id))
}
