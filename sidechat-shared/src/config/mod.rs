//! # Configuration
//!
//! Client settings resolved from defaults, an optional YAML or JSON file,
//! `SIDECHAT_*` environment variables and command-line overrides.

pub mod client;

pub use client::{Config, ConfigError, ConfigOverrides};
