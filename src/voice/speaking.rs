//! Debounced "AI is speaking" indicator

use std::time::Duration;

use tokio::time::Instant;

/// How long after the last audio chunk the indicator stays on
pub const SPEAKING_HOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default)]
pub struct SpeakingState {
    until: Option<Instant>,
}

impl SpeakingState {
    /// Record an inbound audio chunk, extending the hold
    pub fn mark_audio(&mut self, now: Instant) {
        self.until = Some(now + SPEAKING_HOLD);
    }

    /// Clear the indicator if the hold has run out; returns whether it changed
    pub fn expire(&mut self, now: Instant) -> bool {
        if self.until.is_some_and(|until| now >= until) {
            self.until = None;
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.until = None;
    }

    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.until.is_some()
    }

    /// When the indicator will switch off, if it is on
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_extends_hold() {
        let start = Instant::now();
        let mut state = SpeakingState::default();
        assert!(!state.is_speaking());

        state.mark_audio(start);
        state.mark_audio(start + Duration::from_millis(300));
        assert!(!state.expire(start + Duration::from_millis(600)));
        assert!(state.is_speaking());

        assert!(state.expire(start + Duration::from_millis(800)));
        assert!(!state.is_speaking());
        assert!(state.deadline().is_none());
    }

    #[test]
    fn test_clear_is_immediate() {
        let mut state = SpeakingState::default();
        state.mark_audio(Instant::now());
        state.clear();
        assert!(!state.is_speaking());
        assert!(!state.expire(Instant::now() + SPEAKING_HOLD));
    }
}
