//! Configuration management for the duplex voice server
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, `config/{env}.yaml`)
//! - Environment variables (`DUPLEX_VOICE__` prefix, `__` separator)
//!
//! Settings are an explicit value handed to the session manager at
//! construction; nothing here is process-global.

pub mod constants;
pub mod settings;

pub use duplex_voice_core::{NoiseReductionMode, TranscriptionConfig};
pub use settings::{
    load_settings, CredentialsConfig, LlmSettings, ObservabilityConfig, RuntimeEnvironment,
    ServerConfig, Settings, StorageConfig, TtsSettings, UpstreamConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
