//! 16-bit PCM wire format shared by capture and playback

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Sample rate for microphone capture (16kHz for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of the audio the voice service streams back
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Samples per captured block (256ms at 16kHz)
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// One block of base64-encoded little-endian i16 mono PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioChunk {
    data: String,
    sample_rate: u32,
    channels: u16,
}

impl EncodedAudioChunk {
    /// Encode float samples in [-1.0, 1.0] into a chunk
    #[must_use]
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: STANDARD.encode(encode_pcm16(samples)),
            sample_rate,
            channels: 1,
        }
    }

    /// Wrap an already base64-encoded payload received from the wire
    #[must_use]
    pub const fn from_base64(data: String, sample_rate: u32) -> Self {
        Self {
            data,
            sample_rate,
            channels: 1,
        }
    }

    /// Base64 payload
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Consume the chunk, returning the base64 payload
    #[must_use]
    pub fn into_data(self) -> String {
        self.data
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// MIME tag used on the wire, e.g. `audio/pcm;rate=16000`
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Decode the payload back to float samples
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` if the payload is not valid base64 or not a
    /// whole number of 16-bit samples
    pub fn decode_samples(&self) -> Result<Vec<f32>> {
        let bytes = STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| Error::Decode(format!("invalid base64 audio: {e}")))?;
        decode_pcm16(&bytes)
    }
}

/// Map one float sample to a full-scale signed 16-bit integer
///
/// Negative values scale by 32768 and non-negative values by 32767, so
/// -1.0 maps to `i16::MIN` and 1.0 to `i16::MAX`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Serialize float samples as little-endian i16 bytes
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Reinterpret little-endian i16 bytes as float samples
///
/// # Errors
///
/// Returns `Error::Decode` for an empty payload or an odd byte count
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.is_empty() {
        return Err(Error::Decode("empty audio payload".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "audio payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}
