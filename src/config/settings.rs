//! Typed view over the effective configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::BuiltinDefaults;
use super::effective::EffectiveConfig;

/// Presentation limits
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    pub max_issues: usize,
    pub max_failing_tests: usize,
    pub max_message_length: usize,
}

/// External tool locations
#[derive(Debug, Clone, PartialEq)]
pub struct ToolchainSettings {
    pub xcrun: String,
    pub xcodebuild: String,
    pub swift: String,
    pub command_timeout: Duration,
}

/// Everything the binary and pipelines read from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub display: DisplaySettings,
    pub continuation_window: usize,
    pub toolchain: ToolchainSettings,
    pub logs_dir: PathBuf,
    pub logging_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            display: DisplaySettings {
                max_issues: defaults.max_issues as usize,
                max_failing_tests: defaults.max_failing_tests as usize,
                max_message_length: defaults.max_message_length as usize,
            },
            continuation_window: defaults.continuation_window as usize,
            toolchain: ToolchainSettings {
                xcrun: defaults.xcrun,
                xcodebuild: defaults.xcodebuild,
                swift: defaults.swift,
                command_timeout: Duration::from_secs(defaults.command_timeout_seconds),
            },
            logs_dir: expand_home(&defaults.logs_dir),
            logging_level: defaults.logging_level,
        }
    }
}

impl Settings {
    /// Read typed settings; values absent from `config` keep their defaults.
    pub fn from_effective(config: &EffectiveConfig) -> Self {
        let fallback = Settings::default();
        let usize_at = |key: &str, default: usize| {
            config.get_u64(key).map(|v| v as usize).unwrap_or(default)
        };
        let string_at = |key: &str, default: &str| {
            config.get_str(key).unwrap_or(default).to_string()
        };

        Self {
            display: DisplaySettings {
                max_issues: usize_at("display.max_issues", fallback.display.max_issues),
                max_failing_tests: usize_at(
                    "display.max_failing_tests",
                    fallback.display.max_failing_tests,
                ),
                max_message_length: usize_at(
                    "display.max_message_length",
                    fallback.display.max_message_length,
                ),
            },
            continuation_window: usize_at("parsing.continuation_window", fallback.continuation_window),
            toolchain: ToolchainSettings {
                xcrun: string_at("toolchain.xcrun", &fallback.toolchain.xcrun),
                xcodebuild: string_at("toolchain.xcodebuild", &fallback.toolchain.xcodebuild),
                swift: string_at("toolchain.swift", &fallback.toolchain.swift),
                command_timeout: config
                    .get_u64("toolchain.command_timeout_seconds")
                    .map(Duration::from_secs)
                    .unwrap_or(fallback.toolchain.command_timeout),
            },
            logs_dir: config
                .get_str("logs.dir")
                .map(expand_home)
                .unwrap_or(fallback.logs_dir),
            logging_level: string_at("logging.level", &fallback.logging_level),
        }
    }
}

/// Expand a leading `~/` to $HOME.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_defaults() {
        let config = EffectiveConfig::build(None, None, None).unwrap();
        let settings = Settings::from_effective(&config);
        assert_eq!(settings.display.max_issues, 25);
        assert_eq!(settings.continuation_window, 5);
        assert_eq!(settings.toolchain.command_timeout, Duration::from_secs(1800));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_from_overrides() {
        let cli = serde_json::json!({
            "display": {"max_issues": 3},
            "parsing": {"continuation_window": 9},
            "toolchain": {"xcrun": "/opt/xcrun", "command_timeout_seconds": 60},
            "logs": {"dir": "/var/tmp/xcdiag"}
        });
        let config = EffectiveConfig::build(None, None, Some(cli)).unwrap();
        let settings = Settings::from_effective(&config);

        assert_eq!(settings.display.max_issues, 3);
        assert_eq!(settings.continuation_window, 9);
        assert_eq!(settings.toolchain.xcrun, "/opt/xcrun");
        assert_eq!(settings.toolchain.command_timeout, Duration::from_secs(60));
        assert_eq!(settings.logs_dir, PathBuf::from("/var/tmp/xcdiag"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = env::var_os("HOME") {
            assert_eq!(expand_home("~/x"), PathBuf::from(home).join("x"));
        }
    }
}
