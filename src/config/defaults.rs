//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Issues rendered per kind before the truncation note (default: 25)
    pub max_issues: u64,

    /// Failing tests rendered (default: 20)
    pub max_failing_tests: u64,

    /// Longest message rendered before truncation (default: 500)
    pub max_message_length: u64,

    /// Lines scanned for Swift Testing continuation lines (default: 5)
    pub continuation_window: u64,

    pub xcrun: String,
    pub xcodebuild: String,
    pub swift: String,

    /// Per-command timeout in seconds (default: 1800 = 30 minutes)
    pub command_timeout_seconds: u64,

    /// Operation log directory; `~` expands to $HOME
    pub logs_dir: String,

    /// Default tracing filter when RUST_LOG is unset
    pub logging_level: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            max_issues: 25,
            max_failing_tests: 20,
            max_message_length: 500,
            continuation_window: 5,
            xcrun: "xcrun".to_string(),
            xcodebuild: "xcodebuild".to_string(),
            swift: "swift".to_string(),
            command_timeout_seconds: 1800,
            logs_dir: "~/.cache/xcdiag/logs".to_string(),
            logging_level: "info".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "display": {
                "max_issues": self.max_issues,
                "max_failing_tests": self.max_failing_tests,
                "max_message_length": self.max_message_length
            },
            "parsing": {
                "continuation_window": self.continuation_window
            },
            "toolchain": {
                "xcrun": self.xcrun,
                "xcodebuild": self.xcodebuild,
                "swift": self.swift,
                "command_timeout_seconds": self.command_timeout_seconds
            },
            "logs": {
                "dir": self.logs_dir
            },
            "logging": {
                "level": self.logging_level
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.max_issues, 25);
        assert_eq!(defaults.continuation_window, 5);
        assert_eq!(defaults.command_timeout_seconds, 1800);
        assert_eq!(defaults.xcrun, "xcrun");
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["display"]["max_failing_tests"], 20);
        assert_eq!(value["parsing"]["continuation_window"], 5);
        assert_eq!(value["toolchain"]["swift"], "swift");
        assert_eq!(value["logging"]["level"], "info");
    }
}
