//! Layered configuration: files on disk, CLI overrides, typed settings.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use xcdiag::config::{
    default_repo_config_path, parse_override, set_path, ConfigError, ConfigOrigin, EffectiveConfig,
    Settings,
};

fn overrides(items: &[&str]) -> serde_json::Value {
    let mut value = serde_json::json!({});
    for item in items {
        let (key, v) = parse_override(item).unwrap();
        set_path(&mut value, &key, v);
    }
    value
}

// =============================================================================
// Precedence
// =============================================================================

#[test]
fn test_repo_file_then_cli_overrides() {
    let dir = TempDir::new().unwrap();
    let host = dir.path().join("host.toml");
    fs::write(
        &host,
        "[toolchain]\nxcrun = \"/usr/local/bin/xcrun\"\ncommand_timeout_seconds = 600\n",
    )
    .unwrap();
    let repo = default_repo_config_path(dir.path());
    fs::write(
        &repo,
        "[display]\nmax_issues = 5\nmax_failing_tests = 3\n\n[parsing]\ncontinuation_window = 8\n",
    )
    .unwrap();

    let config = EffectiveConfig::build(
        Some(host.as_path()),
        Some(repo.as_path()),
        Some(overrides(&["display.max_issues=2", "logging.level=debug"])),
    )
    .unwrap();
    let settings = Settings::from_effective(&config);

    assert_eq!(settings.display.max_issues, 2);
    assert_eq!(settings.display.max_failing_tests, 3);
    assert_eq!(settings.display.max_message_length, 500);
    assert_eq!(settings.continuation_window, 8);
    assert_eq!(settings.toolchain.xcrun, "/usr/local/bin/xcrun");
    assert_eq!(settings.toolchain.command_timeout, Duration::from_secs(600));
    assert_eq!(settings.logging_level, "debug");

    let origins: Vec<_> = config.sources.iter().map(|s| s.origin.clone()).collect();
    assert_eq!(
        origins,
        vec![ConfigOrigin::Builtin, ConfigOrigin::Host, ConfigOrigin::Repo, ConfigOrigin::Cli]
    );
}

#[test]
fn test_digest_tracks_file_bytes() {
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join(".xcdiag.toml");

    fs::write(&repo, "[display]\nmax_issues = 5\n").unwrap();
    let first = EffectiveConfig::build(None, Some(repo.as_path()), None).unwrap();
    fs::write(&repo, "[display]\nmax_issues = 6\n").unwrap();
    let second = EffectiveConfig::build(None, Some(repo.as_path()), None).unwrap();

    assert_ne!(first.sources[1].digest, second.sources[1].digest);
    assert_eq!(
        first.sources[1].path.as_deref().map(PathBuf::from),
        Some(repo.clone())
    );
}

#[test]
fn test_effective_config_json() {
    let config = EffectiveConfig::build(None, None, Some(overrides(&["logs.dir=/tmp/xcdiag"]))).unwrap();
    let json: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();

    assert_eq!(json["schema_id"], "xcdiag/effective_config@1");
    assert_eq!(json["config"]["logs"]["dir"], "/tmp/xcdiag");
    assert_eq!(json["sources"][1]["origin"], "cli");
}

// =============================================================================
// Rejections
// =============================================================================

#[test]
fn test_override_out_of_range() {
    let result = EffectiveConfig::build(None, None, Some(overrides(&["parsing.continuation_window=0"])));
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));

    let result = EffectiveConfig::build(
        None,
        None,
        Some(overrides(&["toolchain.command_timeout_seconds=90000"])),
    );
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_override_wrong_type() {
    let result = EffectiveConfig::build(None, None, Some(overrides(&["display.max_issues=lots"])));
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_bad_repo_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join(".xcdiag.toml");
    fs::write(&repo, "display = [unterminated").unwrap();

    let err = EffectiveConfig::build(None, Some(repo.as_path()), None).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
    assert!(err.to_string().contains(".xcdiag.toml"));
}
