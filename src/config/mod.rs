//! Configuration module.
//!
//! Provides [`AppConfig`] (top-level settings) with its per-subsystem
//! sections, [`AppPaths`] for the platform settings location, and TOML
//! loading via [`AppConfig::load_from`] / [`ProcessingConfig::load_or_default`].

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, ConfigError, ProcessingConfig, QueueConfig, SampleFormat, UiConfig,
};
