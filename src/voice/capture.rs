//! Microphone capture encoder
//!
//! Opens the input device at 16kHz, slices the incoming frames into fixed
//! blocks and hands each block to a callback as an [`EncodedAudioChunk`].

use std::sync::Arc;

use super::device::{AudioInput, InputStream};
use super::pcm::{CAPTURE_BLOCK_SIZE, CAPTURE_SAMPLE_RATE, EncodedAudioChunk, f32_to_i16};
use crate::{Error, Result};

/// Accumulates raw frames and emits one chunk per full block
pub struct BlockEncoder<F> {
    block_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    on_chunk: F,
}

impl<F: FnMut(EncodedAudioChunk)> BlockEncoder<F> {
    /// Create an encoder emitting `block_size`-sample chunks
    #[must_use]
    pub fn new(block_size: usize, sample_rate: u32, on_chunk: F) -> Self {
        Self {
            block_size: block_size.max(1),
            sample_rate,
            pending: Vec::with_capacity(block_size),
            on_chunk,
        }
    }

    /// Feed frames; invokes the callback for every block completed
    pub fn push(&mut self, frames: &[f32]) {
        let mut frames = frames;
        while !frames.is_empty() {
            let wanted = self.block_size - self.pending.len();
            let take = wanted.min(frames.len());
            self.pending.extend_from_slice(&frames[..take]);
            frames = &frames[take..];

            if self.pending.len() == self.block_size {
                let chunk = EncodedAudioChunk::from_samples(&self.pending, self.sample_rate);
                self.pending.clear();
                (self.on_chunk)(chunk);
            }
        }
    }

    /// Samples waiting for the next block
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// One open microphone capture
struct CaptureSession {
    stream: Box<dyn InputStream>,
}

/// Captures microphone audio and emits wire-ready chunks
pub struct CaptureEncoder {
    input: Arc<dyn AudioInput>,
    block_size: usize,
    session: Option<CaptureSession>,
}

impl CaptureEncoder {
    /// Create a capture encoder over the given input device
    #[must_use]
    pub fn new(input: Arc<dyn AudioInput>) -> Self {
        Self::with_block_size(input, CAPTURE_BLOCK_SIZE)
    }

    /// Create a capture encoder with a custom block size
    #[must_use]
    pub fn with_block_size(input: Arc<dyn AudioInput>, block_size: usize) -> Self {
        Self {
            input,
            block_size,
            session: None,
        }
    }

    /// Start capturing, calling `on_chunk` once per encoded block
    ///
    /// Does nothing if capture is already running.
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the microphone is missing or access is denied
    pub fn start<F>(&mut self, on_chunk: F) -> Result<()>
    where
        F: FnMut(EncodedAudioChunk) + Send + 'static,
    {
        if self.session.is_some() {
            return Ok(());
        }

        let mut encoder = BlockEncoder::new(self.block_size, CAPTURE_SAMPLE_RATE, on_chunk);
        let stream = self
            .input
            .open(
                CAPTURE_SAMPLE_RATE,
                Box::new(move |frames: &[f32]| encoder.push(frames)),
            )
            .map_err(|e| match e {
                Error::Device(_) => e,
                other => Error::Device(other.to_string()),
            })?;

        self.session = Some(CaptureSession { stream });
        tracing::debug!(
            sample_rate = CAPTURE_SAMPLE_RATE,
            block_size = self.block_size,
            "capture encoder started"
        );
        Ok(())
    }

    /// Stop capturing and release the device
    ///
    /// Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stream.close();
            tracing::debug!("capture encoder stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for CaptureEncoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(f32_to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
