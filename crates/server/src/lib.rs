//! Parley Server
//!
//! WebSocket and HTTP endpoints in front of the per-session turn controller.

pub mod backends;
pub mod http;
pub mod session;
pub mod state;
pub mod websocket;

pub use backends::build_orchestrator;
pub use http::create_router;
pub use session::{Session, SessionRegistry, SessionSummary};
pub use state::AppState;
pub use websocket::Connection;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Server at capacity ({0} sessions)")]
    Capacity(usize),

    #[error("Session not initialized; send initialize first")]
    NotInitialized,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(#[from] parley_config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable reason string sent to the client
    pub fn reason(&self) -> &'static str {
        match self {
            ServerError::Session(_) => "session_error",
            ServerError::Capacity(_) => "capacity",
            ServerError::NotInitialized => "not_initialized",
            ServerError::Backend(_) => "backend_error",
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

impl From<parley_pipeline::PipelineError> for ServerError {
    fn from(err: parley_pipeline::PipelineError) -> Self {
        ServerError::Backend(err.to_string())
    }
}

impl From<parley_llm::LlmError> for ServerError {
    fn from(err: parley_llm::LlmError) -> Self {
        ServerError::Backend(err.to_string())
    }
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Capacity(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::NotInitialized => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Backend(_) => axum::http::StatusCode::BAD_GATEWAY,
            ServerError::Config(_) | ServerError::Internal(_) => {
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
