//! WAV container encoding
//!
//! Outbound speech is wrapped in a canonical 44-byte RIFF/WAVE header
//! followed by the raw PCM payload.

use crate::audio::AudioFormat;
use crate::{Error, Result};

/// Length of the canonical PCM WAV header
pub const WAV_HEADER_LEN: usize = 44;

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

/// Wrap PCM bytes in a WAV container.
///
/// Layout: `RIFF`, `36 + data_len`, `WAVE`, `fmt ` chunk (16 bytes: format 1,
/// channels, sample rate, byte rate, block align, bits per sample), `data`,
/// `data_len`, payload. All integers little-endian.
pub fn encode_wav(pcm: &[u8], format: AudioFormat) -> Result<Vec<u8>> {
    let data_len = u32::try_from(pcm.len())
        .ok()
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| Error::Audio(format!("PCM payload too large: {} bytes", pcm.len())))?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&format.byte_rate().to_le_bytes());
    out.extend_from_slice(&format.block_align().to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);

    Ok(out)
}
