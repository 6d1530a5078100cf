//! Configuration loading and env substitution.
//!
//! Config files: `botbridge.toml`, `botbridge.yaml`, or `botbridge.json`,
//! searched in `./` then in the user config directory.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{BridgeConfig, ChannelsConfig},
};
