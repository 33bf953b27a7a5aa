//! Error types shared across crates

use thiserror::Error;

/// Failure reported by a [`Transcriber`](crate::Transcriber) backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionError {
    #[error("Transcriber unavailable: {0}")]
    Unavailable(String),

    #[error("Transcription failed: {0}")]
    Failed(String),

    #[error("Unsupported audio: {0}")]
    UnsupportedAudio(String),
}

/// Failure reported by a [`Generator`](crate::Generator) backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generator unavailable: {0}")]
    Unavailable(String),

    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure reported by a [`Synthesizer`](crate::Synthesizer) backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Synthesizer unavailable: {0}")]
    Unavailable(String),

    #[error("Synthesis failed: {0}")]
    Failed(String),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),
}

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(String),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result alias using the core [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
