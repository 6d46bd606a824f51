//! Configuration loading: file discovery, `${VAR}` substitution, env overrides.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, discover_and_load, find_config_file, load_config},
    schema::{AppConfig, EmbedderConfig, EmbedderProvider, FinragConfig, PathsConfig, RagConfig},
};
