//! PCM16 audio helpers
//!
//! Inbound audio is raw signed 16-bit little-endian PCM. Energy is measured
//! on the raw sample scale (0..=32768), not in dB.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes per PCM16 sample
pub const PCM16_BYTES_PER_SAMPLE: usize = 2;

/// Shape of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16_mono(16_000)
    }
}

impl AudioFormat {
    /// 16-bit mono PCM at the given rate
    pub const fn pcm16_mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    /// Bytes occupied by one sample frame across all channels
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    /// Bytes per second of audio
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }

    /// Playback duration of `bytes` of audio in this format
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let rate = self.byte_rate();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / f64::from(rate))
    }

    /// Number of bytes covering `duration` of audio
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let bytes = (duration.as_secs_f64() * f64::from(self.byte_rate())).round() as usize;
        // keep whole sample frames
        let align = usize::from(self.block_align().max(1));
        bytes - bytes % align
    }
}

/// Iterate PCM16 little-endian samples. A trailing odd byte is ignored.
pub fn pcm16_samples(bytes: &[u8]) -> impl Iterator<Item = i16> + '_ {
    bytes
        .chunks_exact(PCM16_BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}

/// Root-mean-square energy of a PCM16 chunk, `sqrt(mean(sample^2))`.
///
/// Returns 0.0 for a chunk with no complete samples.
pub fn rms_energy(bytes: &[u8]) -> f32 {
    let mut count = 0usize;
    let sum_squares: f64 = pcm16_samples(bytes)
        .map(|s| {
            count += 1;
            let s = f64::from(s);
            s * s
        })
        .sum();

    if count == 0 {
        return 0.0;
    }
    (sum_squares / count as f64).sqrt() as f32
}

/// Serialize samples as PCM16 little-endian bytes
pub fn samples_to_pcm16(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * PCM16_BYTES_PER_SAMPLE);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
