//! Speech processing traits

use async_trait::async_trait;

use crate::audio::AudioFormat;
use crate::error::{SynthesisError, TranscriptionError};

/// Receiver for interim transcripts produced while transcription is running
pub trait PartialSink: Send + Sync {
    fn partial(&self, text: &str);
}

/// Sink that drops interim transcripts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPartials;

impl PartialSink for NoPartials {
    fn partial(&self, _text: &str) {}
}

/// Speech-to-Text interface
///
/// # Example
///
/// ```ignore
/// let stt: Arc<dyn Transcriber> = Arc::new(HttpTranscriber::new(config)?);
/// let text = stt.transcribe(&pcm, AudioFormat::default(), &NoPartials).await?;
/// ```
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    /// Transcribe one buffered utterance
    ///
    /// # Arguments
    /// * `audio` - PCM16 little-endian bytes
    /// * `format` - shape of `audio`
    /// * `partials` - receives interim text, if the backend produces any
    ///
    /// # Returns
    /// `None` (or blank text) when nothing intelligible was heard
    async fn transcribe(
        &self,
        audio: &[u8],
        format: AudioFormat,
        partials: &dyn PartialSink,
    ) -> Result<Option<String>, TranscriptionError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// PCM produced by a [`Synthesizer`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesizedAudio {
    /// PCM frames in playback order
    pub frames: Vec<Vec<u8>>,
    /// Shape of every frame
    pub format: AudioFormat,
}

impl SynthesizedAudio {
    pub fn new(frames: Vec<Vec<u8>>, format: AudioFormat) -> Self {
        Self { frames, format }
    }

    /// Frames concatenated into one buffer
    pub fn pcm(&self) -> Vec<u8> {
        self.frames.concat()
    }

    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }
}

/// Text-to-Speech interface
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    /// Synthesize one chunk of reply text
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_audio_concat() {
        let audio = SynthesizedAudio::new(vec![vec![1, 2], vec![], vec![3, 4]], AudioFormat::default());
        assert_eq!(audio.pcm(), vec![1, 2, 3, 4]);
        assert_eq!(audio.byte_len(), 4);
        assert!(!audio.is_empty());
        assert!(SynthesizedAudio::default().is_empty());
    }
}
