//! Streaming playback scheduler
//!
//! Schedules decoded chunks back to back against the output clock so that
//! streamed speech plays without gaps, and supports a hard flush when the
//! service reports an interruption.

use std::sync::Arc;

use super::device::{AudioOutput, OutputContext};
use super::pcm::{EncodedAudioChunk, PLAYBACK_SAMPLE_RATE};
use crate::{Error, Result};

/// Output context plus the next free slot on its timeline
struct PlaybackSession {
    context: Box<dyn OutputContext>,
    next_time: f64,
}

/// Gapless scheduler for streamed 24kHz audio
pub struct PlaybackScheduler {
    output: Arc<dyn AudioOutput>,
    sample_rate: u32,
    session: Option<PlaybackSession>,
}

impl PlaybackScheduler {
    /// Create a scheduler over the given output device
    #[must_use]
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            sample_rate: PLAYBACK_SAMPLE_RATE,
            session: None,
        }
    }

    /// Open the output context if none is open, resetting the cursor to now
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the output device cannot be opened
    pub fn init(&mut self) -> Result<()> {
        if self
            .session
            .as_ref()
            .is_some_and(|session| !session.context.is_closed())
        {
            return Ok(());
        }

        let context = self.output.open(self.sample_rate)?;
        let next_time = context.current_time();
        self.session = Some(PlaybackSession { context, next_time });

        tracing::debug!(sample_rate = self.sample_rate, "playback context opened");
        Ok(())
    }

    /// Decode and schedule one chunk after everything already queued
    ///
    /// Returns the scheduled start time, or `None` if the chunk was dropped.
    pub fn play(&mut self, chunk: &EncodedAudioChunk) -> Option<f64> {
        match self.schedule(chunk) {
            Ok(start) => Some(start),
            Err(e) => {
                tracing::warn!(error = %e, "dropping audio chunk");
                None
            }
        }
    }

    fn schedule(&mut self, chunk: &EncodedAudioChunk) -> Result<f64> {
        if chunk.sample_rate() != self.sample_rate {
            return Err(Error::Decode(format!(
                "expected {} Hz audio, got {} Hz",
                self.sample_rate,
                chunk.sample_rate()
            )));
        }

        self.init()?;
        let samples = chunk.decode_samples()?;
        #[allow(clippy::cast_precision_loss)]
        let duration = samples.len() as f64 / f64::from(self.sample_rate);

        let Some(session) = self.session.as_mut() else {
            return Err(Error::Audio("playback context missing".to_string()));
        };

        let start = session.next_time.max(session.context.current_time());
        session.context.schedule(samples, start)?;
        session.next_time = start + duration;

        tracing::trace!(start, duration, "scheduled audio chunk");
        Ok(start)
    }

    /// Flush everything queued and close the output context
    ///
    /// Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if !session.context.is_closed() {
                session.context.close();
            }
            tracing::debug!("playback stopped");
        }
    }

    /// Next scheduling time; zero when no context is open
    #[must_use]
    pub fn cursor(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.next_time)
    }

    /// Check if an output context is open
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.context.is_closed())
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generate a sine tone for speaker checks
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sine_tone(frequency: f32, seconds: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = (seconds * sample_rate as f32) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (t * frequency * 2.0 * std::f32::consts::PI).sin() * amplitude
        })
        .collect()
}
