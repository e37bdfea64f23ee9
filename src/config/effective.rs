//! Effective configuration with provenance
//!
//! The merged configuration plus a record of which files contributed,
//! each with the SHA-256 digest of its raw bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Schema identifier
pub const SCHEMA_ID: &str = "xcdiag/effective_config@1";

const MAX_COMMAND_TIMEOUT_SECONDS: u64 = 86400;
const CONTINUATION_WINDOW_RANGE: std::ops::RangeInclusive<u64> = 1..=50;

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    Repo,
    Cli,
}

/// A contributing config source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_id: String,

    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

/// `~/.config/xcdiag/config.toml`, when a home directory is known
pub fn default_host_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/xcdiag/config.toml"))
}

/// `.xcdiag.toml` in `dir`
pub fn default_repo_config_path(dir: &Path) -> PathBuf {
    dir.join(".xcdiag.toml")
}

impl EffectiveConfig {
    /// Build effective config from layers. Missing files are skipped.
    pub fn build(
        host_config_path: Option<&Path>,
        repo_config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        for (origin, path) in [
            (ConfigOrigin::Host, host_config_path),
            (ConfigOrigin::Repo, repo_config_path),
        ] {
            let Some(path) = path.filter(|p| p.exists()) else {
                continue;
            };
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        Self::validate_config(&merged)?;

        Ok(Self {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;

        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok((toml_to_json(toml_value), digest))
    }

    fn validate_config(config: &Value) -> Result<(), ConfigError> {
        let u64_at = |path: &str| -> Result<Option<u64>, ConfigError> {
            match lookup(config, path) {
                None => Ok(None),
                Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                    ConfigError::ValidationError(format!("{} must be a non-negative integer", path))
                }),
            }
        };

        for key in [
            "display.max_issues",
            "display.max_failing_tests",
            "display.max_message_length",
        ] {
            if u64_at(key)? == Some(0) {
                return Err(ConfigError::ValidationError(format!("{} must be positive", key)));
            }
        }

        if let Some(window) = u64_at("parsing.continuation_window")? {
            if !CONTINUATION_WINDOW_RANGE.contains(&window) {
                return Err(ConfigError::ValidationError(format!(
                    "parsing.continuation_window must be in [{}, {}]",
                    CONTINUATION_WINDOW_RANGE.start(),
                    CONTINUATION_WINDOW_RANGE.end()
                )));
            }
        }

        if let Some(timeout) = u64_at("toolchain.command_timeout_seconds")? {
            if timeout == 0 || timeout > MAX_COMMAND_TIMEOUT_SECONDS {
                return Err(ConfigError::ValidationError(format!(
                    "toolchain.command_timeout_seconds must be in (0, {}]",
                    MAX_COMMAND_TIMEOUT_SECONDS
                )));
            }
        }

        for key in [
            "toolchain.xcrun",
            "toolchain.xcodebuild",
            "toolchain.swift",
            "logs.dir",
            "logging.level",
        ] {
            if let Some(v) = lookup(config, key) {
                if v.as_str().map_or(true, str::is_empty) {
                    return Err(ConfigError::ValidationError(format!(
                        "{} must be a non-empty string",
                        key
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.config, path)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }
}

fn lookup<'a>(config: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = config;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
