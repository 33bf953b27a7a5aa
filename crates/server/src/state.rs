//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use parley_config::{CharactersConfig, Settings};
use parley_pipeline::TurnOrchestrator;

use crate::session::SessionRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Settings loaded at startup
    pub config: Arc<Settings>,
    /// Session registry
    pub sessions: Arc<SessionRegistry>,
    /// Turn pipeline with its injected backends
    pub orchestrator: Arc<TurnOrchestrator>,
}

impl AppState {
    pub fn new(config: Settings, orchestrator: TurnOrchestrator) -> Self {
        let sessions = SessionRegistry::new(&config.server, config.turn.clone());
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn characters(&self) -> &CharactersConfig {
        &self.config.characters
    }
}
