//! Simulator device descriptors and the simctl device-list boundary

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Errors reading the device list
#[derive(Debug, Error)]
pub enum DeviceListError {
    #[error("failed to parse device list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("device list has no \"devices\" object")]
    MissingDevices,
}

/// Simulator boot state as reported by simctl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Shutdown,
    Booting,
    Booted,
    #[serde(rename = "Shutting Down")]
    ShuttingDown,
}

impl DeviceState {
    /// Parse a simctl state string. Unknown states yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Shutdown" => Some(DeviceState::Shutdown),
            "Booting" => Some(DeviceState::Booting),
            "Booted" => Some(DeviceState::Booted),
            "Shutting Down" | "ShuttingDown" => Some(DeviceState::ShuttingDown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Shutdown => "Shutdown",
            DeviceState::Booting => "Booting",
            DeviceState::Booted => "Booted",
            DeviceState::ShuttingDown => "Shutting Down",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OS family of a simulator runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "tvOS")]
    TvOs,
    #[serde(rename = "watchOS")]
    WatchOs,
    #[serde(rename = "visionOS")]
    VisionOs,
    #[serde(rename = "macOS")]
    MacOs,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Platform {
    /// Derive the platform from a runtime identifier such as
    /// `com.apple.CoreSimulator.SimRuntime.iOS-17-2`.
    pub fn from_runtime(runtime_identifier: &str) -> Self {
        let id = runtime_identifier;
        if id.contains("xrOS") || id.contains("visionOS") {
            Platform::VisionOs
        } else if id.contains("watchOS") {
            Platform::WatchOs
        } else if id.contains("tvOS") {
            Platform::TvOs
        } else if id.contains("iOS") {
            Platform::Ios
        } else if id.contains("macOS") {
            Platform::MacOs
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::TvOs => "tvOS",
            Platform::WatchOs => "watchOS",
            Platform::VisionOs => "visionOS",
            Platform::MacOs => "macOS",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulator device, as listed at resolution time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub state: DeviceState,
    pub platform: Platform,
    pub runtime_identifier: String,
    pub available: bool,
}

impl DeviceDescriptor {
    pub fn is_booted(&self) -> bool {
        self.state == DeviceState::Booted
    }

    /// Numeric runtime version, e.g. `[17, 2]` for `...SimRuntime.iOS-17-2`
    pub fn runtime_version(&self) -> Vec<u32> {
        runtime_version(&self.runtime_identifier)
    }
}

/// Parse the numeric version out of a runtime identifier.
///
/// Modern identifiers end in `SimRuntime.<Platform>-<major>-<minor>`; legacy
/// keys look like `iOS 12.4`. Every run of digits after the prefix is one
/// component.
pub fn runtime_version(runtime_identifier: &str) -> Vec<u32> {
    let tail = runtime_identifier
        .rsplit("SimRuntime.")
        .next()
        .unwrap_or(runtime_identifier);
    tail.split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Compare two numeric versions, padding the shorter with zeros.
pub fn compare_versions(a: &[u32], b: &[u32]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let a_val = a.get(i).copied().unwrap_or(0);
        let b_val = b.get(i).copied().unwrap_or(0);
        match a_val.cmp(&b_val) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Parse `simctl list devices --json` output.
///
/// Fails closed per entry: devices without a `udid` or `name`, with an
/// unknown state, or under a runtime whose value is not an array are
/// dropped with a warning. Only a document without a `devices` object is
/// an error.
pub fn parse_device_list(json: &str) -> Result<Vec<DeviceDescriptor>, DeviceListError> {
    let root: Value = serde_json::from_str(json)?;
    let runtimes = root
        .get("devices")
        .and_then(Value::as_object)
        .ok_or(DeviceListError::MissingDevices)?;

    let mut devices = Vec::new();
    let mut dropped = 0usize;

    for (runtime_identifier, entries) in runtimes {
        let Some(entries) = entries.as_array() else {
            warn!(runtime = %runtime_identifier, "device list runtime value is not an array");
            continue;
        };

        for entry in entries {
            match parse_entry(runtime_identifier, entry) {
                Some(device) => devices.push(device),
                None => dropped += 1,
            }
        }
    }

    if dropped > 0 {
        warn!(dropped, "dropped malformed device list entries");
    }

    Ok(devices)
}

fn parse_entry(runtime_identifier: &str, entry: &Value) -> Option<DeviceDescriptor> {
    let id = entry.get("udid")?.as_str()?;
    let name = entry.get("name")?.as_str()?;
    let state = DeviceState::parse(entry.get("state")?.as_str()?)?;
    if id.is_empty() || name.is_empty() {
        return None;
    }

    let available = match entry.get("isAvailable") {
        Some(v) => v.as_bool().unwrap_or(false),
        // older simctl releases
        None => entry
            .get("availability")
            .and_then(Value::as_str)
            .is_some_and(|a| a == "(available)"),
    };

    Some(DeviceDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        state,
        platform: Platform::from_runtime(runtime_identifier),
        runtime_identifier: runtime_identifier.to_string(),
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_LIST: &str = r#"{
  "devices": {
    "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
      {"udid": "AAAAAAAA-0000-0000-0000-000000000001", "name": "iPhone 15", "state": "Booted", "isAvailable": true},
      {"udid": "AAAAAAAA-0000-0000-0000-000000000002", "name": "iPhone 15 Pro", "state": "Shutdown", "isAvailable": true}
    ],
    "com.apple.CoreSimulator.SimRuntime.xrOS-1-0": [
      {"udid": "AAAAAAAA-0000-0000-0000-000000000003", "name": "Apple Vision Pro", "state": "Shutting Down", "isAvailable": false}
    ]
  }
}"#;

    #[test]
    fn test_parse_device_list() {
        let devices = parse_device_list(DEVICE_LIST).unwrap();
        assert_eq!(devices.len(), 3);

        let booted = devices.iter().find(|d| d.is_booted()).unwrap();
        assert_eq!(booted.name, "iPhone 15");
        assert_eq!(booted.platform, Platform::Ios);
        assert_eq!(booted.runtime_version(), vec![17, 2]);

        let vision = devices.iter().find(|d| d.name == "Apple Vision Pro").unwrap();
        assert_eq!(vision.platform, Platform::VisionOs);
        assert_eq!(vision.state, DeviceState::ShuttingDown);
        assert!(!vision.available);
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let json = r#"{"devices": {
            "com.apple.CoreSimulator.SimRuntime.iOS-18-0": [
                {"name": "No Udid", "state": "Booted", "isAvailable": true},
                {"udid": "X", "state": "Booted", "isAvailable": true},
                {"udid": "Y", "name": "Weird", "state": "Creating", "isAvailable": true},
                {"udid": "Z", "name": "Good", "state": "Shutdown", "isAvailable": true}
            ],
            "com.apple.CoreSimulator.SimRuntime.tvOS-18-0": {"not": "an array"}
        }}"#;
        let devices = parse_device_list(json).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Good");
    }

    #[test]
    fn test_missing_devices_object() {
        assert!(matches!(parse_device_list("{}"), Err(DeviceListError::MissingDevices)));
        assert!(matches!(parse_device_list("nope"), Err(DeviceListError::Json(_))));
    }

    #[test]
    fn test_legacy_availability_string() {
        let json = r#"{"devices": {"iOS 12.4": [
            {"udid": "A", "name": "iPhone X", "state": "Shutdown", "availability": "(available)"},
            {"udid": "B", "name": "iPhone 6", "state": "Shutdown", "availability": "(unavailable, runtime profile not found)"}
        ]}}"#;
        let devices = parse_device_list(json).unwrap();
        assert!(devices[0].available);
        assert!(!devices[1].available);
        assert_eq!(devices[0].platform, Platform::Ios);
    }

    #[test]
    fn test_platform_from_runtime() {
        assert_eq!(Platform::from_runtime("com.apple.CoreSimulator.SimRuntime.watchOS-10-2"), Platform::WatchOs);
        assert_eq!(Platform::from_runtime("com.apple.CoreSimulator.SimRuntime.tvOS-17-0"), Platform::TvOs);
        assert_eq!(Platform::from_runtime("com.apple.CoreSimulator.SimRuntime.visionOS-2-0"), Platform::VisionOs);
        assert_eq!(Platform::from_runtime("com.apple.CoreSimulator.SimRuntime.Android-1"), Platform::Unknown);
    }

    #[test]
    fn test_runtime_version_and_compare() {
        assert_eq!(runtime_version("com.apple.CoreSimulator.SimRuntime.iOS-17-0-1"), vec![17, 0, 1]);
        assert_eq!(runtime_version("iOS 12.4"), vec![12, 4]);
        assert_eq!(runtime_version("garbage"), Vec::<u32>::new());
        assert_eq!(compare_versions(&[17, 2], &[17, 10]), Ordering::Less);
        assert_eq!(compare_versions(&[18], &[18, 0]), Ordering::Equal);
        assert_eq!(compare_versions(&[18], &[17, 9]), Ordering::Greater);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&DeviceState::ShuttingDown).unwrap(), "\"Shutting Down\"");
        assert_eq!(serde_json::to_string(&Platform::VisionOs).unwrap(), "\"visionOS\"");
    }
}
