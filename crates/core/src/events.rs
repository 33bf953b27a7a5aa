//! Wire vocabulary
//!
//! JSON text frames in both directions are tagged by a `type` field in
//! snake_case. Binary frames carry raw PCM16 audio and have no type here.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// Message sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind a session, optionally naming a character
    Initialize {
        #[serde(default)]
        character: Option<String>,
    },
    /// Typed user input, bypassing transcription
    TextMessage { text: String },
    /// Rebind the session's character
    SwitchCharacter { character: String },
    Ping,
    Pong,
}

/// Event sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection accepted
    Connected { session_id: String },
    /// Session bound to a character
    Initialized { character: String },
    /// Sustained speech energy observed
    SpeechDetected { confidence: f32, energy: f32 },
    /// Interim transcript
    TranscriptionPartial { text: String },
    /// Final transcript; empty when nothing intelligible was heard
    TranscriptionComplete { text: String },
    /// A turn has started
    ProcessingStarted { character: String },
    /// Reply text is known and about to be spoken
    ResponseStart {
        total_chunks: usize,
        full_text: String,
    },
    /// One synthesized chunk. `audio` is a base64 WAV file.
    AudioChunk {
        chunk_id: usize,
        total_chunks: usize,
        is_final: bool,
        text: String,
        audio: String,
    },
    /// Reply fully delivered
    ResponseComplete { chunks_sent: usize },
    /// Recoverable failure
    Error { message: String, reason: String },
    Ping,
    Pong,
}

impl ServerEvent {
    /// Build an `audio_chunk` event from WAV bytes. `chunk_id` is 1-based.
    pub fn audio_chunk(chunk_id: usize, total_chunks: usize, text: &str, wav: &[u8]) -> Self {
        ServerEvent::AudioChunk {
            chunk_id,
            total_chunks,
            is_final: chunk_id == total_chunks,
            text: text.to_string(),
            audio: BASE64.encode(wav),
        }
    }

    pub fn error(message: impl Into<String>, reason: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
            reason: reason.into(),
        }
    }

    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Initialized { .. } => "initialized",
            ServerEvent::SpeechDetected { .. } => "speech_detected",
            ServerEvent::TranscriptionPartial { .. } => "transcription_partial",
            ServerEvent::TranscriptionComplete { .. } => "transcription_complete",
            ServerEvent::ProcessingStarted { .. } => "processing_started",
            ServerEvent::ResponseStart { .. } => "response_start",
            ServerEvent::AudioChunk { .. } => "audio_chunk",
            ServerEvent::ResponseComplete { .. } => "response_complete",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Ping => "ping",
            ServerEvent::Pong => "pong",
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
