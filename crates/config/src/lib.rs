//! Configuration loading, env substitution, and validation.
//!
//! Config files: `hookrelay.toml`, `hookrelay.yaml`, `hookrelay.yml`, or
//! `hookrelay.json`, searched in `./` then the user config directory
//! (`~/.config/hookrelay/` on Linux).
//!
//! `${ENV_VAR}` and `${ENV_VAR:-default}` are substituted before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, default_data_dir, discover_and_load, find_config_file, load_config},
    schema::{ChannelsConfig, HookrelayConfig, MetricsConfig, StorageConfig, UsageConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
