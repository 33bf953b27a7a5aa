//! Turn metrics
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding process installs a recorder.

use std::time::Duration;

use parley_core::Stage;

use crate::state::TurnState;

pub const STAGE_LATENCY: &str = "parley_stage_latency_seconds";
pub const TURNS_TOTAL: &str = "parley_turns_total";
pub const TTS_CHUNKS_SKIPPED: &str = "parley_tts_chunks_skipped_total";
pub const WATCHDOG_RESETS: &str = "parley_watchdog_resets_total";
pub const BUFFERS_DISCARDED: &str = "parley_audio_buffers_discarded_total";

/// Record one backend call. `outcome` is "ok" or a wire reason.
pub fn record_stage_latency(stage: Stage, outcome: &'static str, elapsed: Duration) {
    metrics::histogram!(STAGE_LATENCY, "stage" => stage.as_str(), "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

/// Record a finished turn: "completed", "empty" or a wire reason
pub fn record_turn(outcome: &'static str) {
    metrics::counter!(TURNS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_skipped_chunk() {
    metrics::counter!(TTS_CHUNKS_SKIPPED).increment(1);
}

pub fn record_watchdog_reset(state: TurnState) {
    metrics::counter!(WATCHDOG_RESETS, "state" => state.as_str()).increment(1);
}

pub fn record_discarded_buffer() {
    metrics::counter!(BUFFERS_DISCARDED).increment(1);
}
