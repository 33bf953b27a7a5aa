//! Reply generation
//!
//! Features:
//! - Ollama chat backend implementing the core `Generator` capability
//! - Bounded retries with exponential backoff for transient failures
//! - Prompt assembly from the character and the turn history

pub mod backend;
pub mod prompt;

pub use backend::{LlmConfig, OllamaGenerator};
pub use prompt::{build_messages, Message, Role};

use parley_core::GenerationError;
use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for GenerationError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Network(_) | LlmError::Timeout => GenerationError::Unavailable(err.to_string()),
            LlmError::InvalidResponse(msg) => GenerationError::InvalidResponse(msg),
            LlmError::Api(_) | LlmError::Configuration(_) => GenerationError::Failed(err.to_string()),
        }
    }
}

impl From<LlmError> for parley_core::Error {
    fn from(err: LlmError) -> Self {
        parley_core::Error::Generation(err.into())
    }
}
