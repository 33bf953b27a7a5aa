//! Centralized defaults
//!
//! Single source of truth for default values used by the config structs and,
//! through them, the rest of the workspace.

/// Inbound audio
pub mod audio {
    /// Client PCM sample rate (Hz)
    pub const SAMPLE_RATE: u32 = 16_000;

    /// Smallest buffer processed after speech was flagged (1 s of PCM16 mono)
    pub const MIN_PROCESS_BYTES: usize = 32_000;

    /// Buffer size that forces processing regardless of speech (5 s)
    pub const MAX_PROCESS_BYTES: usize = 160_000;

    /// Energy samples averaged by the noise gate
    pub const NOISE_WINDOW: usize = 5;

    /// Noise gate: mean recent energy below this fraction of the speech
    /// threshold discards the buffer
    pub const NOISE_FLOOR_RATIO: f32 = 0.6;
}

/// Speech activity heuristic
pub mod speech {
    /// RMS on the raw PCM16 scale
    pub const ENERGY_THRESHOLD: f32 = 500.0;

    /// Energy samples remembered
    pub const HISTORY_CAPACITY: usize = 10;

    /// Consecutive loud chunks needed to trigger
    pub const MIN_SUSTAINED_CHUNKS: usize = 3;

    /// Minimum gap between two triggers (ms)
    pub const COOLDOWN_MS: u64 = 2_000;
}

/// Stage deadlines and recovery (ms)
pub mod timeouts {
    pub const STT_MS: u64 = 5_000;

    pub const LLM_MS: u64 = 4_000;

    /// Per synthesized chunk
    pub const TTS_MS: u64 = 3_000;

    pub const WATCHDOG_TICK_MS: u64 = 500;

    /// Longest a session may stay in one state outside LISTENING
    pub const MAX_STATE_DURATION_MS: u64 = 7_000;
}

/// Reply shaping
pub mod response {
    /// Upper bound on characters per synthesized chunk
    pub const MAX_CHUNK_CHARS: usize = 200;

    /// Turns kept per session
    pub const HISTORY_LIMIT: usize = 20;
}

/// Session registry
pub mod sessions {
    pub const MAX_SESSIONS: usize = 100;

    pub const IDLE_TIMEOUT_SECS: u64 = 300;

    pub const CLEANUP_INTERVAL_SECS: u64 = 30;

    pub const KEEPALIVE_SECS: u64 = 20;

    pub const DEFAULT_CHARACTER: &str = "assistant";
}

/// Backend endpoints
pub mod endpoints {
    /// Ollama LLM endpoint
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Transcription sidecar
    pub const STT_DEFAULT: &str = "http://127.0.0.1:8090";

    /// Synthesis sidecar
    pub const TTS_DEFAULT: &str = "http://127.0.0.1:8091";
}
