//! Turn controller thresholds

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{audio, response, speech, timeouts};

/// Per-session turn controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub timeouts: StageTimeoutConfig,

    /// Upper bound on characters per synthesized chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Turns kept in history and offered to the generator
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_max_chunk_chars() -> usize {
    response::MAX_CHUNK_CHARS
}
fn default_history_limit() -> usize {
    response::HISTORY_LIMIT
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            detector: DetectorConfig::default(),
            watchdog: WatchdogConfig::default(),
            timeouts: StageTimeoutConfig::default(),
            max_chunk_chars: default_max_chunk_chars(),
            history_limit: default_history_limit(),
        }
    }
}

/// Audio buffering and the noise gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Inbound PCM16 mono sample rate
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Bytes required before a flagged utterance is processed
    #[serde(default = "default_min_process_bytes")]
    pub min_process_bytes: usize,

    /// Bytes that force processing
    #[serde(default = "default_max_process_bytes")]
    pub max_process_bytes: usize,

    /// Recent energy samples averaged by the noise gate
    #[serde(default = "default_noise_window")]
    pub noise_window: usize,

    /// Fraction of the speech threshold below which a buffer is noise
    #[serde(default = "default_noise_floor_ratio")]
    pub noise_floor_ratio: f32,
}

fn default_sample_rate() -> u32 {
    audio::SAMPLE_RATE
}
fn default_min_process_bytes() -> usize {
    audio::MIN_PROCESS_BYTES
}
fn default_max_process_bytes() -> usize {
    audio::MAX_PROCESS_BYTES
}
fn default_noise_window() -> usize {
    audio::NOISE_WINDOW
}
fn default_noise_floor_ratio() -> f32 {
    audio::NOISE_FLOOR_RATIO
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            min_process_bytes: default_min_process_bytes(),
            max_process_bytes: default_max_process_bytes(),
            noise_window: default_noise_window(),
            noise_floor_ratio: default_noise_floor_ratio(),
        }
    }
}

/// Sustained-energy speech heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// RMS threshold on the raw PCM16 scale
    #[serde(default = "default_energy_threshold")]
    pub energy_threshold: f32,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_min_sustained_chunks")]
    pub min_sustained_chunks: usize,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_energy_threshold() -> f32 {
    speech::ENERGY_THRESHOLD
}
fn default_history_capacity() -> usize {
    speech::HISTORY_CAPACITY
}
fn default_min_sustained_chunks() -> usize {
    speech::MIN_SUSTAINED_CHUNKS
}
fn default_cooldown_ms() -> u64 {
    speech::COOLDOWN_MS
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            energy_threshold: default_energy_threshold(),
            history_capacity: default_history_capacity(),
            min_sustained_chunks: default_min_sustained_chunks(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl DetectorConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Reliability watchdog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_max_state_duration_ms")]
    pub max_state_duration_ms: u64,
}

fn default_tick_ms() -> u64 {
    timeouts::WATCHDOG_TICK_MS
}
fn default_max_state_duration_ms() -> u64 {
    timeouts::MAX_STATE_DURATION_MS
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            max_state_duration_ms: default_max_state_duration_ms(),
        }
    }
}

impl WatchdogConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn max_state_duration(&self) -> Duration {
        Duration::from_millis(self.max_state_duration_ms)
    }
}

/// Deadlines applied to each backend call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTimeoutConfig {
    #[serde(default = "default_stt_ms")]
    pub stt_ms: u64,

    #[serde(default = "default_llm_ms")]
    pub llm_ms: u64,

    /// Applied per chunk
    #[serde(default = "default_tts_ms")]
    pub tts_ms: u64,
}

fn default_stt_ms() -> u64 {
    timeouts::STT_MS
}
fn default_llm_ms() -> u64 {
    timeouts::LLM_MS
}
fn default_tts_ms() -> u64 {
    timeouts::TTS_MS
}

impl Default for StageTimeoutConfig {
    fn default() -> Self {
        Self {
            stt_ms: default_stt_ms(),
            llm_ms: default_llm_ms(),
            tts_ms: default_tts_ms(),
        }
    }
}

impl StageTimeoutConfig {
    pub fn stt(&self) -> Duration {
        Duration::from_millis(self.stt_ms)
    }

    pub fn llm(&self) -> Duration {
        Duration::from_millis(self.llm_ms)
    }

    pub fn tts(&self) -> Duration {
        Duration::from_millis(self.tts_ms)
    }
}
