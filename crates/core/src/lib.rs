//! Core traits and types for the parley voice server
//!
//! This crate provides foundational types used across all other crates:
//! - Capability traits for pluggable backends (transcription, generation, synthesis)
//! - PCM16 audio helpers and WAV encoding
//! - Conversation turn and history types
//! - The client/server wire vocabulary
//! - Error types

pub mod audio;
pub mod conversation;
pub mod error;
pub mod events;
pub mod traits;
pub mod wav;

pub use audio::{pcm16_samples, rms_energy, samples_to_pcm16, AudioFormat};
pub use conversation::{ConversationHistory, Stage, StageTimings, Turn};
pub use error::{Error, GenerationError, Result, SynthesisError, TranscriptionError};
pub use events::{ClientMessage, ServerEvent};
pub use traits::{
    Generator, NoPartials, PartialSink, SynthesizedAudio, Synthesizer, Transcriber,
};
pub use wav::{encode_wav, WAV_HEADER_LEN};
