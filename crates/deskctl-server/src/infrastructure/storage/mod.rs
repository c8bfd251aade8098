//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML file from an explicit path or the
//! platform config directory, falls back to defaults on first run, and
//! layers command-line overrides on top.

pub mod config;

pub use config::{load_config, ConfigError, ConfigOverrides, FileConfig};
