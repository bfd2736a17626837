//! Audio device abstraction and the cpal-backed defaults
//!
//! The capture encoder and playback scheduler talk to hardware only through
//! [`AudioInput`] and [`AudioOutput`], so both can run against fakes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Receives raw mono frames from an input device
pub type FrameCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Opens microphone streams
pub trait AudioInput {
    /// Open the default input device at `sample_rate` mono
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no device exists or access is denied
    fn open(&self, sample_rate: u32, on_frames: FrameCallback) -> Result<Box<dyn InputStream>>;
}

/// An open microphone stream
pub trait InputStream {
    /// Disconnect the stream and release the device
    fn close(&mut self);
}

/// Opens output contexts
pub trait AudioOutput {
    /// Open an output context running at `sample_rate` mono
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if no output device can be opened
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputContext>>;
}

/// A running output clock that accepts buffers scheduled at absolute times
pub trait OutputContext {
    /// Seconds of audio rendered since the context was opened
    fn current_time(&self) -> f64;

    /// Queue `samples` to start playing at `start_at` seconds
    ///
    /// # Errors
    ///
    /// Returns error if the context is closed
    fn schedule(&mut self, samples: Vec<f32>, start_at: f64) -> Result<()>;

    /// Stop rendering and release the device
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Pick a mono config at `sample_rate`, falling back to stereo
fn find_config(ranges: &[SupportedStreamConfigRange], sample_rate: u32) -> Option<StreamConfig> {
    let supports = |c: &SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.min_sample_rate() <= SampleRate(sample_rate)
            && c.max_sample_rate() >= SampleRate(sample_rate)
    };

    ranges
        .iter()
        .find(|c| supports(c, 1))
        .or_else(|| ranges.iter().find(|c| supports(c, 2)))
        .map(|c| c.clone().with_sample_rate(SampleRate(sample_rate)).config())
}

/// Microphone input through the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInput;

struct CpalInputStream {
    stream: Option<Stream>,
}

impl InputStream for CpalInputStream {
    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(error = %e, "failed to pause input stream");
            }
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

impl AudioInput for CpalInput {
    fn open(
        &self,
        sample_rate: u32,
        mut on_frames: FrameCallback,
    ) -> Result<Box<dyn InputStream>> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .collect();
        let config = find_config(&ranges, sample_rate)
            .ok_or_else(|| Error::Device("no suitable audio config found".to_string()))?;

        let channels = usize::from(config.channels);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio capture initialized"
        );

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if channels == 1 {
                        on_frames(data);
                    } else {
                        #[allow(clippy::cast_precision_loss)]
                        let mono: Vec<f32> = data
                            .chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                            .collect();
                        on_frames(&mono);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        tracing::debug!("audio capture started");
        Ok(Box::new(CpalInputStream {
            stream: Some(stream),
        }))
    }
}

/// A buffer waiting on (or currently on) the output timeline
struct ScheduledBuffer {
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledBuffer {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }

    fn sample_at(&self, frame: u64) -> Option<f32> {
        let offset = usize::try_from(frame.checked_sub(self.start_frame)?).ok()?;
        self.samples.get(offset).copied()
    }
}

/// Frame clock plus the queue of buffers scheduled against it
#[derive(Default)]
struct Timeline {
    frames_rendered: u64,
    queue: VecDeque<ScheduledBuffer>,
}

impl Timeline {
    fn insert(&mut self, buffer: ScheduledBuffer) {
        let idx = self
            .queue
            .partition_point(|b| b.start_frame <= buffer.start_frame);
        self.queue.insert(idx, buffer);
    }

    /// Fill an interleaved output block, advancing the clock one frame per
    /// `channels` samples
    fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            let position = self.frames_rendered;
            let mut sample = 0.0_f32;
            for buffer in &self.queue {
                if buffer.start_frame > position {
                    break;
                }
                if let Some(s) = buffer.sample_at(position) {
                    sample += s;
                }
            }
            frame.fill(sample.clamp(-1.0, 1.0));
            self.frames_rendered += 1;
        }

        let now = self.frames_rendered;
        self.queue.retain(|b| b.end_frame() > now);
    }
}

/// Speaker output through the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

struct CpalOutputContext {
    stream: Option<Stream>,
    timeline: Arc<Mutex<Timeline>>,
    sample_rate: u32,
}

impl AudioOutput for CpalOutput {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputContext>> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .collect();
        let config = find_config(&ranges, sample_rate)
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let channels = usize::from(config.channels);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio playback initialized"
        );

        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let render_timeline = Arc::clone(&timeline);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut timeline) = render_timeline.lock() {
                        timeline.render(data, channels);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Box::new(CpalOutputContext {
            stream: Some(stream),
            timeline,
            sample_rate,
        }))
    }
}

impl OutputContext for CpalOutputContext {
    #[allow(clippy::cast_precision_loss)]
    fn current_time(&self) -> f64 {
        self.timeline
            .lock()
            .map(|t| t.frames_rendered as f64 / f64::from(self.sample_rate))
            .unwrap_or_default()
    }

    fn schedule(&mut self, samples: Vec<f32>, start_at: f64) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Audio("output context is closed".to_string()));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start_frame = (start_at.max(0.0) * f64::from(self.sample_rate)).round() as u64;

        self.timeline
            .lock()
            .map_err(|_| Error::Audio("playback timeline poisoned".to_string()))?
            .insert(ScheduledBuffer {
                start_frame,
                samples,
            });
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            if let Ok(mut timeline) = self.timeline.lock() {
                timeline.queue.clear();
            }
            tracing::debug!("audio playback closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}
