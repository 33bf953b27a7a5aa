//! Configuration management for the parley voice server
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, then `config/{env}`)
//! - Environment variables (`PARLEY__` prefix, `__` as the section separator)
//!
//! Every turn-controller threshold lives under `turn.*` so deployments can
//! tune detection and recovery without a rebuild.

pub mod backends;
pub mod constants;
pub mod settings;
pub mod turn;

pub use backends::{BackendsConfig, LlmBackendConfig, SttBackendConfig, TtsBackendConfig, TtsKind};
pub use settings::{
    load_settings, CharactersConfig, ObservabilityConfig, RuntimeEnvironment, ServerConfig,
    Settings,
};
pub use turn::{DetectorConfig, IngestConfig, StageTimeoutConfig, TurnConfig, WatchdogConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => ConfigError::FileNotFound(path),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
