//! Turn failure taxonomy
//!
//! Every variant maps to a stable wire reason carried by `error{reason}`.

use std::time::Duration;
use thiserror::Error;

use parley_core::Stage;

use crate::state::TurnState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnError {
    #[error("{stage} stage timed out after {}ms", .limit.as_millis())]
    StageTimeout { stage: Stage, limit: Duration },

    #[error("{stage} stage failed: {message}")]
    StageError { stage: Stage, message: String },

    #[error("Reply produced no speakable chunks")]
    EmptyResult,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Stuck in {state} for {}ms, recovered", .elapsed.as_millis())]
    WatchdogForcedReset { state: TurnState, elapsed: Duration },

    #[error("A turn is already in progress ({0})")]
    Busy(TurnState),

    #[error("Text message is empty")]
    EmptyInput,
}

impl TurnError {
    /// Stable reason string sent to the client
    pub fn reason(&self) -> &'static str {
        match self {
            TurnError::StageTimeout { stage, .. } => match stage {
                Stage::Stt => "stt_timeout",
                Stage::Llm => "llm_timeout",
                Stage::Tts => "tts_timeout",
            },
            TurnError::StageError { stage, .. } => match stage {
                Stage::Stt => "stt_error",
                Stage::Llm => "llm_error",
                Stage::Tts => "tts_error",
            },
            TurnError::EmptyResult => "empty_chunks",
            TurnError::Protocol(_) => "protocol_error",
            TurnError::WatchdogForcedReset { .. } => "watchdog_timeout",
            TurnError::Busy(_) => "turn_in_progress",
            TurnError::EmptyInput => "empty_text",
        }
    }
}
