//! Configuration
//!
//! Four layers, later wins:
//! 1. Built-in defaults
//! 2. Host config (~/.config/xcdiag/config.toml)
//! 3. Repo config (.xcdiag.toml)
//! 4. CLI overrides (`--set key=value`)

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{
    default_host_config_path, default_repo_config_path, ConfigError, ConfigOrigin, ConfigSource,
    EffectiveConfig,
};
pub use merge::{deep_merge, merge_layers, parse_override, set_path};
pub use settings::{DisplaySettings, Settings, ToolchainSettings};
