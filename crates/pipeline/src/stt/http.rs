//! HTTP STT Backend - posts buffered PCM to a transcription sidecar
//!
//! `POST {url}/transcribe` with the raw PCM16 body. The sidecar answers with
//! JSON `{"text": "...", "partials": [...], "error": null}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use parley_config::SttBackendConfig;
use parley_core::{AudioFormat, PartialSink, Transcriber, TranscriptionError};

use crate::PipelineError;

/// HTTP STT Backend configuration
#[derive(Debug, Clone)]
pub struct HttpSttConfig {
    /// Base URL of the sidecar
    pub url: String,
    /// Language hint sent as `X-Language`
    pub language: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpSttConfig {
    fn default() -> Self {
        SttBackendConfig::default().into()
    }
}

impl From<SttBackendConfig> for HttpSttConfig {
    fn from(config: SttBackendConfig) -> Self {
        Self {
            url: config.url,
            language: config.language,
            timeout_ms: config.request_timeout_ms,
        }
    }
}

/// Response from the sidecar
#[derive(Debug, Deserialize)]
struct SttResponse {
    #[serde(default)]
    text: String,
    /// Interim hypotheses, oldest first
    #[serde(default)]
    partials: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpTranscriber {
    config: HttpSttConfig,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(config: HttpSttConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PipelineError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            url = %config.url,
            language = %config.language,
            "HTTP STT backend configured"
        );

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/transcribe", self.config.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        partials: &dyn PartialSink,
    ) -> Result<Option<String>, TranscriptionError> {
        if format.bits_per_sample != 16 {
            return Err(TranscriptionError::UnsupportedAudio(format!(
                "{} bits per sample",
                format.bits_per_sample
            )));
        }
        if audio.is_empty() {
            return Ok(None);
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "audio/pcm")
            .header("X-Language", &self.config.language)
            .header("X-Sample-Rate", format.sample_rate.to_string())
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    TranscriptionError::Unavailable(e.to_string())
                } else {
                    TranscriptionError::Failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranscriptionError::Failed(format!(
                "STT service returned {}",
                status
            )));
        }

        let result: SttResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Failed(format!("Invalid STT response: {}", e)))?;

        if let Some(error) = result.error {
            return Err(TranscriptionError::Failed(error));
        }

        for partial in &result.partials {
            partials.partial(partial);
        }

        let text = result.text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_backend_settings() {
        let config = HttpSttConfig::from(SttBackendConfig {
            url: "http://stt:9000/".to_string(),
            language: "de".to_string(),
            request_timeout_ms: 1234,
        });
        assert_eq!(config.language, "de");
        assert_eq!(config.timeout_ms, 1234);

        let stt = HttpTranscriber::new(config).unwrap();
        assert_eq!(stt.endpoint(), "http://stt:9000/transcribe");
        assert_eq!(stt.name(), "http");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"text":" hello world ","partials":["hel","hello"]}"#;
        let response: SttResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text.trim(), "hello world");
        assert_eq!(response.partials.len(), 2);
        assert!(response.error.is_none());

        let response: SttResponse = serde_json::from_str(r#"{"error":"model busy"}"#).unwrap();
        assert_eq!(response.error.as_deref(), Some("model busy"));
        assert!(response.text.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_pcm16() {
        let stt = HttpTranscriber::new(HttpSttConfig::default()).unwrap();
        let format = AudioFormat {
            bits_per_sample: 8,
            ..AudioFormat::default()
        };
        let result = stt.transcribe(&[0u8; 8], format, &parley_core::NoPartials).await;
        assert!(matches!(result, Err(TranscriptionError::UnsupportedAudio(_))));
    }

    #[tokio::test]
    async fn test_empty_audio_is_no_transcript() {
        let stt = HttpTranscriber::new(HttpSttConfig::default()).unwrap();
        let result = stt
            .transcribe(&[], AudioFormat::default(), &parley_core::NoPartials)
            .await;
        assert_eq!(result, Ok(None));
    }
}
