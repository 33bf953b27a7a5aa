//! Per-connection conversational turn controller
//!
//! Features:
//! - Energy-based speech activity detection with cooldown
//! - Audio buffering with a noise gate
//! - Guarded turn state machine shared by the pipeline and the watchdog
//! - Transcribe → generate → synthesize orchestration behind per-stage deadlines
//! - Per-session reliability watchdog that forces recovery from hung stages
//! - HTTP sidecar adapters for transcription and synthesis

pub mod chunker;
pub mod conversation;
pub mod error;
pub mod events;
pub mod ingest;
pub mod metrics;
pub mod orchestrator;
pub mod state;
pub mod stt;
pub mod timeout;
pub mod tts;
pub mod vad;
pub mod watchdog;

pub use chunker::ResponseChunker;
pub use conversation::Conversation;
pub use error::TurnError;
pub use events::EventSink;
pub use ingest::{AudioIngestBuffer, IngestReport, Readiness};
pub use orchestrator::TurnOrchestrator;
pub use state::{Expired, IngestAction, IngestOutcome, TurnState, TurnStateMachine, TurnTicket};
pub use stt::{HttpSttConfig, HttpTranscriber};
pub use timeout::with_timeout;
pub use tts::{HttpSynthesizer, HttpTtsConfig, SilenceSynthesizer};
pub use vad::{EnergySample, Observation, SpeechActivityDetector};
pub use watchdog::{ReliabilityWatchdog, WatchdogHandle};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    Core(#[from] parley_core::Error),
}
