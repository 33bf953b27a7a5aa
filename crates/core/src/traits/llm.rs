//! Reply generation trait

use async_trait::async_trait;

use crate::conversation::Turn;
use crate::error::GenerationError;

/// Produces the agent's reply for the latest user turn
///
/// `history` is oldest first; its last entry is the turn being answered and
/// has no `agent_text` yet. Retries and backoff, if any, belong inside the
/// implementation; the caller applies a single overall deadline.
#[async_trait]
pub trait Generator: Send + Sync + 'static {
    async fn generate(&self, character: &str, history: &[Turn]) -> Result<String, GenerationError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
