//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{audio, endpoints, models, API_KEY_ENV};
use crate::ConfigError;
use duplex_voice_core::TranscriptionConfig;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, RuntimeEnvironment::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub transcription: TranscriptionConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub tts: TtsSettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_transcription()?;
        self.validate_generation()?;
        self.validate_credentials()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "Max sessions must be at least 1".to_string(),
            });
        }

        if self.storage.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.base_dir".to_string(),
                message: "Storage directory cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    fn validate_transcription(&self) -> Result<(), ConfigError> {
        let t = &self.transcription;

        if !(0.0..=1.0).contains(&t.turn_detection_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "transcription.turn_detection_threshold".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    t.turn_detection_threshold
                ),
            });
        }

        if t.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transcription.queue_capacity".to_string(),
                message: "Queue capacity must be at least 1".to_string(),
            });
        }

        if t.push_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transcription.push_timeout_ms".to_string(),
                message: "Push timeout must be positive".to_string(),
            });
        }

        Ok(())
    }

    fn validate_generation(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }

        if self.tts.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.chunk_size".to_string(),
                message: "Chunk size must be at least 1 byte".to_string(),
            });
        }

        if self.tts.chunk_size % 2 != 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.chunk_size".to_string(),
                message: format!(
                    "Must be a whole number of 16-bit samples, got {}",
                    self.tts.chunk_size
                ),
            });
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upstream.timeout_secs".to_string(),
                message: "Timeout must be positive".to_string(),
            });
        }

        Ok(())
    }

    fn validate_credentials(&self) -> Result<(), ConfigError> {
        // Development may run against local engines that take no key
        if self.environment.is_production() && self.credentials.api_key.is_none() {
            return Err(ConfigError::MissingField(format!(
                "credentials.api_key (or {})",
                API_KEY_ENV
            )));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Concurrent sessions accepted before new connections are refused
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed origins; empty falls back to localhost
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_sessions() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Artifact storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root under which one directory per session is created
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// Upstream credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// API key for the generative services; falls back to `OPENAI_API_KEY`
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,
}

fn default_api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty())
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
        }
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Upstream service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// REST base for chat completions and speech synthesis
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Realtime transcription socket
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,

    /// Request timeout for REST calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sent as `OpenAI-Organization` on REST calls
    #[serde(default)]
    pub organization: Option<String>,
}

fn default_api_base() -> String {
    endpoints::API_BASE_DEFAULT.to_string()
}

fn default_realtime_url() -> String {
    endpoints::REALTIME_DEFAULT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            realtime_url: default_realtime_url(),
            timeout_secs: default_timeout_secs(),
            organization: None,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Reply generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_model() -> String {
    models::LLM_DEFAULT.to_string()
}

fn default_system_prompt() -> String {
    "You're a helpful assistant. You reply with only one word.".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    256
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Speech synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    #[serde(default = "default_tts_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// Delivery instructions (tone, pacing)
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Bytes per chunk sent to the client
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_tts_model() -> String {
    models::TTS_DEFAULT.to_string()
}

fn default_voice() -> String {
    models::TTS_VOICE_DEFAULT.to_string()
}

fn default_instructions() -> String {
    "Speak in a cheerful and positive tone. language English".to_string()
}

fn default_chunk_size() -> usize {
    audio::TTS_CHUNK_SIZE_DEFAULT
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            model: default_tts_model(),
            voice: default_voice(),
            instructions: default_instructions(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder and expose `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Sources, later ones overriding earlier:
/// 1. `config/default.{yaml,toml,json}`
/// 2. `config/{env}.{yaml,toml,json}` when `env` is given
/// 3. `DUPLEX_VOICE__*` environment variables (e.g. `DUPLEX_VOICE__SERVER__PORT`)
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("DUPLEX_VOICE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(
        environment = ?settings.environment,
        port = settings.server.port,
        base_dir = %settings.storage.base_dir.display(),
        "Settings loaded"
    );

    Ok(settings)
}
