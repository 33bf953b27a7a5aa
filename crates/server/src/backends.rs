//! Backend factory
//!
//! Picks the transcription, generation and synthesis adapters named in
//! `backends.*` and wires them into a [`TurnOrchestrator`]. This is the only
//! place that knows which concrete implementations are in play.

use std::sync::Arc;

use parley_config::{BackendsConfig, Settings, TtsBackendConfig, TtsKind};
use parley_core::{Generator, Synthesizer, Transcriber};
use parley_llm::{LlmConfig, OllamaGenerator};
use parley_pipeline::{
    HttpSttConfig, HttpSynthesizer, HttpTranscriber, HttpTtsConfig, SilenceSynthesizer,
    TurnOrchestrator,
};

use crate::ServerError;

pub fn create_transcriber(config: &BackendsConfig) -> Result<Arc<dyn Transcriber>, ServerError> {
    let stt = HttpTranscriber::new(HttpSttConfig::from(config.stt.clone()))?;
    Ok(Arc::new(stt))
}

pub fn create_generator(config: &BackendsConfig) -> Result<Arc<dyn Generator>, ServerError> {
    let llm = OllamaGenerator::new(LlmConfig::from(&config.llm))?;
    Ok(Arc::new(llm))
}

pub fn create_synthesizer(config: &TtsBackendConfig) -> Result<Arc<dyn Synthesizer>, ServerError> {
    match config.kind {
        TtsKind::Http => {
            let tts = HttpSynthesizer::new(HttpTtsConfig::from(config.clone()))?;
            Ok(Arc::new(tts))
        }
        TtsKind::Silence => {
            tracing::warn!("Using silent synthesizer; replies will carry no speech");
            Ok(Arc::new(SilenceSynthesizer::from_config(config)))
        }
    }
}

/// Build the orchestrator from settings
pub fn build_orchestrator(settings: &Settings) -> Result<TurnOrchestrator, ServerError> {
    let backends = &settings.backends;
    let orchestrator = TurnOrchestrator::new(
        create_transcriber(backends)?,
        create_generator(backends)?,
        create_synthesizer(&backends.tts)?,
        &settings.turn,
    );

    let (stt, llm, tts) = orchestrator.backend_names();
    tracing::info!(stt, llm, tts, "Turn pipeline backends ready");
    Ok(orchestrator)
}
