//! Inbound audio buffering
//!
//! Accumulates PCM16 chunks while the session listens and decides when the
//! buffered utterance is worth transcribing.

use tokio::time::Instant;

use parley_config::{DetectorConfig, IngestConfig};
use parley_core::rms_energy;

use crate::vad::{Observation, SpeechActivityDetector};

/// What the buffer wants done after an append
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readiness {
    /// Keep collecting
    Pending,
    /// Hand the buffer to transcription
    Ready,
    /// Buffer dropped as background noise
    Discarded { mean_energy: f32 },
}

/// Outcome of [`AudioIngestBuffer::append`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestReport {
    /// Detector verdict for the appended chunk
    pub observation: Observation,
    pub readiness: Readiness,
}

pub struct AudioIngestBuffer {
    config: IngestConfig,
    detector: SpeechActivityDetector,
    buffer: Vec<u8>,
    speech_flagged: bool,
}

impl AudioIngestBuffer {
    pub fn new(config: IngestConfig, detector: DetectorConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(config.max_process_bytes),
            config,
            detector: SpeechActivityDetector::new(detector),
            speech_flagged: false,
        }
    }

    /// Append one chunk and report readiness.
    ///
    /// Ready when sustained speech was flagged and the buffer holds at least
    /// `min_process_bytes`, or unconditionally at `max_process_bytes`. If the
    /// recent energy average is under the noise floor at that point the
    /// buffer is cleared instead.
    pub fn append(&mut self, bytes: &[u8], now: Instant) -> IngestReport {
        let observation = self.detector.observe(rms_energy(bytes), now);
        if observation.triggered {
            self.speech_flagged = true;
        }
        self.buffer.extend_from_slice(bytes);

        let len = self.buffer.len();
        let ready = (self.speech_flagged && len >= self.config.min_process_bytes)
            || len >= self.config.max_process_bytes;
        if !ready {
            return IngestReport {
                observation,
                readiness: Readiness::Pending,
            };
        }

        let mean_energy = self.detector.recent_mean(self.config.noise_window);
        let floor = self.config.noise_floor_ratio * self.detector.threshold();
        let readiness = if mean_energy < floor {
            self.clear();
            Readiness::Discarded { mean_energy }
        } else {
            Readiness::Ready
        };

        IngestReport {
            observation,
            readiness,
        }
    }

    /// Move the buffered audio out, leaving the buffer empty and the
    /// detector without history
    pub fn take(&mut self) -> Vec<u8> {
        self.speech_flagged = false;
        self.detector.reset();
        std::mem::take(&mut self.buffer)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.speech_flagged = false;
        self.detector.reset();
    }

    /// Drop the speech flag without touching buffered audio
    pub fn reset_speech_flag(&mut self) {
        self.speech_flagged = false;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn speech_flagged(&self) -> bool {
        self.speech_flagged
    }
}
