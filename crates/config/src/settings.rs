//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::sessions;
use crate::{BackendsConfig, ConfigError, TurnConfig};

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
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Turn controller thresholds
    #[serde(default)]
    pub turn: TurnConfig,

    /// Backend adapters
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Character keys and greetings
    #[serde(default)]
    pub characters: CharactersConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_turn()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::invalid("server.port", "Port cannot be 0"));
        }

        if server.max_sessions == 0 {
            return Err(ConfigError::invalid(
                "server.max_sessions",
                "At least one session must be allowed",
            ));
        }

        if !server.ws_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "server.ws_path",
                format!("Must start with '/', got {:?}", server.ws_path),
            ));
        }

        if server.idle_timeout_secs == 0 || server.cleanup_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "server.idle_timeout_secs",
                "Idle timeout and cleanup interval must be positive",
            ));
        }

        Ok(())
    }

    fn validate_turn(&self) -> Result<(), ConfigError> {
        let turn = &self.turn;
        let ingest = &turn.ingest;

        if ingest.sample_rate == 0 {
            return Err(ConfigError::invalid("turn.ingest.sample_rate", "Must be positive"));
        }

        if ingest.min_process_bytes == 0 || ingest.min_process_bytes > ingest.max_process_bytes {
            return Err(ConfigError::invalid(
                "turn.ingest.min_process_bytes",
                format!(
                    "Must be in 1..={} (max_process_bytes), got {}",
                    ingest.max_process_bytes, ingest.min_process_bytes
                ),
            ));
        }

        if ingest.noise_window == 0 {
            return Err(ConfigError::invalid("turn.ingest.noise_window", "Must be positive"));
        }

        if !(ingest.noise_floor_ratio > 0.0 && ingest.noise_floor_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "turn.ingest.noise_floor_ratio",
                format!("Must be in (0.0, 1.0], got {}", ingest.noise_floor_ratio),
            ));
        }

        let detector = &turn.detector;
        if !(detector.energy_threshold > 0.0) {
            return Err(ConfigError::invalid(
                "turn.detector.energy_threshold",
                format!("Must be positive, got {}", detector.energy_threshold),
            ));
        }

        if detector.min_sustained_chunks == 0
            || detector.min_sustained_chunks > detector.history_capacity
        {
            return Err(ConfigError::invalid(
                "turn.detector.min_sustained_chunks",
                format!(
                    "Must be in 1..={} (history_capacity), got {}",
                    detector.history_capacity, detector.min_sustained_chunks
                ),
            ));
        }

        let watchdog = &turn.watchdog;
        if watchdog.tick_ms == 0 || watchdog.tick_ms >= watchdog.max_state_duration_ms {
            return Err(ConfigError::invalid(
                "turn.watchdog.tick_ms",
                format!(
                    "Must be positive and below max_state_duration_ms ({}), got {}",
                    watchdog.max_state_duration_ms, watchdog.tick_ms
                ),
            ));
        }

        let timeouts = &turn.timeouts;
        if timeouts.stt_ms == 0 || timeouts.llm_ms == 0 || timeouts.tts_ms == 0 {
            return Err(ConfigError::invalid(
                "turn.timeouts",
                "Stage timeouts must be positive",
            ));
        }

        if turn.max_chunk_chars == 0 {
            return Err(ConfigError::invalid("turn.max_chunk_chars", "Must be positive"));
        }

        if turn.history_limit == 0 {
            return Err(ConfigError::invalid("turn.history_limit", "Must be positive"));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Inactivity window after which a session is torn down
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the idle sweep runs
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Application-level ping interval; 0 disables
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_max_sessions() -> usize {
    sessions::MAX_SESSIONS
}
fn default_idle_timeout_secs() -> u64 {
    sessions::IDLE_TIMEOUT_SECS
}
fn default_cleanup_interval_secs() -> u64 {
    sessions::CLEANUP_INTERVAL_SECS
}
fn default_keepalive_secs() -> u64 {
    sessions::KEEPALIVE_SECS
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            keepalive_secs: default_keepalive_secs(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn keepalive(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }
}

/// Character keys are opaque; only the optional greeting is configured here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharactersConfig {
    /// Used when `initialize` names no character
    #[serde(default = "default_character")]
    pub default: String,

    /// Spoken right after `initialized`, keyed by character
    #[serde(default)]
    pub greetings: HashMap<String, String>,
}

fn default_character() -> String {
    sessions::DEFAULT_CHARACTER.to_string()
}

impl Default for CharactersConfig {
    fn default() -> Self {
        Self {
            default: default_character(),
            greetings: HashMap::new(),
        }
    }
}

impl CharactersConfig {
    /// Requested key, or the default when absent or blank
    pub fn resolve(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => self.default.clone(),
        }
    }

    pub fn greeting(&self, character: &str) -> Option<&str> {
        self.greetings
            .get(character)
            .map(String::as_str)
            .filter(|g| !g.trim().is_empty())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority: `PARLEY__*` env vars > `config/{env}` > `config/default` > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("PARLEY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
