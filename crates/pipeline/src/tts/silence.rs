//! Silent synthesizer
//!
//! Produces zeroed PCM16 whose length follows the word count, so clients and
//! pacing can be exercised without a voice model.

use async_trait::async_trait;
use std::time::Duration;

use parley_config::TtsBackendConfig;
use parley_core::{AudioFormat, SynthesisError, SynthesizedAudio, Synthesizer};

/// Frame length of the produced audio
const FRAME: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SilenceSynthesizer {
    format: AudioFormat,
    per_word: Duration,
}

impl SilenceSynthesizer {
    pub fn new(sample_rate: u32, per_word: Duration) -> Self {
        Self {
            format: AudioFormat::pcm16_mono(sample_rate),
            per_word,
        }
    }

    pub fn from_config(config: &TtsBackendConfig) -> Self {
        Self::new(
            config.sample_rate,
            Duration::from_millis(config.silence_ms_per_word),
        )
    }
}

#[async_trait]
impl Synthesizer for SilenceSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        let words = text.split_whitespace().count() as u32;
        let mut remaining = self.format.bytes_for(self.per_word * words);
        let frame_bytes = self.format.bytes_for(FRAME).max(2);

        let mut frames = Vec::new();
        while remaining > 0 {
            let len = remaining.min(frame_bytes);
            frames.push(vec![0u8; len]);
            remaining -= len;
        }
        Ok(SynthesizedAudio::new(frames, self.format))
    }

    fn name(&self) -> &str {
        "silence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_length_follows_word_count() {
        let tts = SilenceSynthesizer::new(16_000, Duration::from_millis(300));
        let audio = tts.synthesize("three short words").await.unwrap();

        // 900ms at 16kHz mono PCM16
        assert_eq!(audio.byte_len(), 28_800);
        assert_eq!(audio.frames.len(), 9);
        assert!(audio.pcm().iter().all(|&b| b == 0));
        assert_eq!(audio.format.duration_of(audio.byte_len()), Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_blank_text_is_empty() {
        let tts = SilenceSynthesizer::from_config(&TtsBackendConfig::default());
        assert!(tts.synthesize("   ").await.unwrap().is_empty());
    }
}
