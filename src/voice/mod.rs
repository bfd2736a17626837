//! Realtime voice pipeline
//!
//! Microphone audio is captured, encoded to 16kHz PCM chunks and streamed to
//! the live session; speech coming back is scheduled for gapless playback.

mod capture;
mod controller;
pub mod device;
mod gate;
mod pcm;
mod playback;
mod speaking;

pub use capture::{BlockEncoder, CaptureEncoder, samples_to_wav};
pub use controller::{
    CAPTURE_QUEUE_CAPACITY, ConnectionState, OPEN_TIMEOUT, SessionController, SessionStatus,
};
pub use device::{AudioInput, AudioOutput, CpalInput, CpalOutput, InputStream, OutputContext};
pub use gate::{OutboundGate, PENDING_LIMIT};
pub use pcm::{
    CAPTURE_BLOCK_SIZE, CAPTURE_SAMPLE_RATE, EncodedAudioChunk, PLAYBACK_SAMPLE_RATE,
    decode_pcm16, encode_pcm16, f32_to_i16,
};
pub use playback::{PlaybackScheduler, sine_tone};
pub use speaking::{SPEAKING_HOLD, SpeakingState};
