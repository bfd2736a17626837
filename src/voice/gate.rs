//! Outbound audio gate for the window between transport open and setup ack
//!
//! Held chunks are released oldest first. At most [`PENDING_LIMIT`] chunks
//! are held; once full, newly captured chunks are dropped with a warning
//! until the service is ready. The capture queue in front of the gate drops
//! the same way when the controller falls [`CAPTURE_QUEUE_CAPACITY`] chunks
//! behind.
//!
//! [`CAPTURE_QUEUE_CAPACITY`]: super::CAPTURE_QUEUE_CAPACITY

use std::collections::VecDeque;

use super::pcm::EncodedAudioChunk;

/// Most chunks held while waiting for the service (about 16s of speech)
pub const PENDING_LIMIT: usize = 64;

/// Holds captured chunks until the service is ready, then releases them in order
#[derive(Debug, Default)]
pub struct OutboundGate {
    ready: bool,
    pending: VecDeque<EncodedAudioChunk>,
}

impl OutboundGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass a chunk through if ready, otherwise hold it
    ///
    /// Returns the chunk to send now, if any.
    pub fn admit(&mut self, chunk: EncodedAudioChunk) -> Option<EncodedAudioChunk> {
        if self.ready {
            return Some(chunk);
        }

        if self.pending.len() >= PENDING_LIMIT {
            tracing::warn!(limit = PENDING_LIMIT, "pending audio queue full, dropping chunk");
        } else {
            self.pending.push_back(chunk);
        }
        None
    }

    /// Mark the service ready and drain everything held, oldest first
    pub fn open(&mut self) -> Vec<EncodedAudioChunk> {
        self.ready = true;
        self.pending.drain(..).collect()
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(value: f32) -> EncodedAudioChunk {
        EncodedAudioChunk::from_samples(&[value; 4], 16_000)
    }

    #[test]
    fn test_holds_until_open_then_fifo() {
        let mut gate = OutboundGate::new();
        assert!(gate.admit(chunk(0.1)).is_none());
        assert!(gate.admit(chunk(0.2)).is_none());
        assert_eq!(gate.pending_len(), 2);

        let released = gate.open();
        assert_eq!(released, vec![chunk(0.1), chunk(0.2)]);
        assert!(gate.is_ready());

        assert_eq!(gate.admit(chunk(0.3)), Some(chunk(0.3)));
        assert_eq!(gate.pending_len(), 0);
    }

    #[test]
    fn test_drops_beyond_limit() {
        let mut gate = OutboundGate::new();
        for _ in 0..PENDING_LIMIT + 5 {
            gate.admit(chunk(0.0));
        }
        assert_eq!(gate.pending_len(), PENDING_LIMIT);
    }
}
