//! Configuration loading and resolution.

pub mod loader;

pub use loader::{
    load_config, resolve_config_path, save_config, ClientConfig, DEFAULT_CONFIG_ENV,
};
