//! Backend adapter selection

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::endpoints;

/// Which adapter serves each capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub stt: SttBackendConfig,

    #[serde(default)]
    pub llm: LlmBackendConfig,

    #[serde(default)]
    pub tts: TtsBackendConfig,
}

/// HTTP transcription sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttBackendConfig {
    #[serde(default = "default_stt_url")]
    pub url: String,

    /// Language hint forwarded to the sidecar
    #[serde(default = "default_language")]
    pub language: String,

    /// Transport-level timeout, independent of the stage deadline
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_stt_url() -> String {
    endpoints::STT_DEFAULT.to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for SttBackendConfig {
    fn default() -> Self {
        Self {
            url: default_stt_url(),
            language: default_language(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Ollama chat backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retries for transient failures inside the adapter
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay, doubled per attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// System prompt; `{character}` is replaced with the session's character key
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_llm_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_model() -> String {
    "qwen3:4b-instruct-2507-q4_K_M".to_string()
}
fn default_max_tokens() -> usize {
    256
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_request_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_system_prompt() -> String {
    "You are {character}, speaking with a user by voice. \
     Answer in a few short spoken sentences without markdown."
        .to_string()
}

impl Default for LlmBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_ms: default_llm_request_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl LlmBackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

/// Synthesis adapter kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsKind {
    /// HTTP sidecar returning raw PCM16
    #[default]
    Http,
    /// Silent audio sized to the text, for local development
    Silence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsBackendConfig {
    #[serde(default)]
    pub kind: TtsKind,

    #[serde(default = "default_tts_url")]
    pub url: String,

    /// Sample rate of the PCM the backend returns
    #[serde(default = "default_tts_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Silence produced per word by the `silence` kind
    #[serde(default = "default_silence_ms_per_word")]
    pub silence_ms_per_word: u64,
}

fn default_tts_url() -> String {
    endpoints::TTS_DEFAULT.to_string()
}
fn default_tts_sample_rate() -> u32 {
    22_050
}
fn default_silence_ms_per_word() -> u64 {
    300
}

impl Default for TtsBackendConfig {
    fn default() -> Self {
        Self {
            kind: TtsKind::default(),
            url: default_tts_url(),
            sample_rate: default_tts_sample_rate(),
            request_timeout_ms: default_request_timeout_ms(),
            silence_ms_per_word: default_silence_ms_per_word(),
        }
    }
}
