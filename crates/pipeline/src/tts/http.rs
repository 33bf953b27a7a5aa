//! HTTP TTS Backend - synthesis sidecar
//!
//! `POST {url}/synthesize` with JSON `{"text": "...", "sample_rate": 22050}`.
//! The body of a successful response is raw PCM16 mono at that rate.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use parley_config::TtsBackendConfig;
use parley_core::{AudioFormat, SynthesisError, SynthesizedAudio, Synthesizer};

use crate::PipelineError;

/// Frames handed to the WAV encoder are split at this many bytes (100ms at
/// 22.05kHz)
const FRAME_BYTES: usize = 4410;

#[derive(Debug, Clone)]
pub struct HttpTtsConfig {
    pub url: String,
    pub sample_rate: u32,
    pub timeout_ms: u64,
}

impl Default for HttpTtsConfig {
    fn default() -> Self {
        TtsBackendConfig::default().into()
    }
}

impl From<TtsBackendConfig> for HttpTtsConfig {
    fn from(config: TtsBackendConfig) -> Self {
        Self {
            url: config.url,
            sample_rate: config.sample_rate,
            timeout_ms: config.request_timeout_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    sample_rate: u32,
}

pub struct HttpSynthesizer {
    config: HttpTtsConfig,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn new(config: HttpTtsConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PipelineError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            url = %config.url,
            sample_rate = config.sample_rate,
            "HTTP TTS backend configured"
        );

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/synthesize", self.config.url.trim_end_matches('/'))
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::pcm16_mono(self.config.sample_rate)
    }
}

/// Wrap a raw PCM16 body, rejecting a torn final sample
fn pcm_to_audio(body: &[u8], format: AudioFormat) -> Result<SynthesizedAudio, SynthesisError> {
    if body.len() % 2 != 0 {
        return Err(SynthesisError::InvalidAudio(format!(
            "odd PCM16 byte count {}",
            body.len()
        )));
    }
    let frames = body.chunks(FRAME_BYTES).map(<[u8]>::to_vec).collect();
    Ok(SynthesizedAudio::new(frames, format))
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        let request = SynthesizeRequest {
            text,
            sample_rate: self.config.sample_rate,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    SynthesisError::Unavailable(e.to_string())
                } else {
                    SynthesisError::Failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::Failed(format!(
                "TTS service returned {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Failed(e.to_string()))?;
        pcm_to_audio(&body, self.format())
    }

    fn name(&self) -> &str {
        "http"
    }
}
