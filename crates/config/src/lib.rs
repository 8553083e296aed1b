//! Configuration: schema, discovery, and loading.
//!
//! Supports `wagate.{toml,yaml,yml,json}` project-local or under
//! `~/.config/wagate/`, with `${ENV_VAR}` substitution in string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config, set_config_dir},
    schema::{ServerConfig, SessionSection, TransportSection, WagateConfig},
};
