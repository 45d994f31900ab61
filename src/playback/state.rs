//! Playback State
//!
//! Session lifecycle and the elapsed-time clock that drives the
//! degradation curve.

use std::fmt;

/// Lifecycle of the playback controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing has been played yet
    #[default]
    Idle,
    /// Recording bytes are being decoded
    Decoding,
    /// A session is rendering and the control loop is ticking
    Playing,
    /// The last session ended or was stopped
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Decoding => write!(f, "Decoding"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Stopped => write!(f, "Stopped"),
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Elapsed time and progress of one session, read off the context clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressClock {
    started_at: f64,
    total_duration_secs: f64,
    last_elapsed: f64,
}

impl ProgressClock {
    /// Start the clock at context time `now`
    pub fn start(now: f64, total_duration_secs: f64) -> Self {
        Self {
            started_at: now,
            total_duration_secs: total_duration_secs.max(f64::EPSILON),
            last_elapsed: 0.0,
        }
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    /// Seconds since start; never decreases between calls
    pub fn elapsed(&mut self, now: f64) -> f64 {
        let elapsed = (now - self.started_at).max(0.0);
        self.last_elapsed = self.last_elapsed.max(elapsed);
        self.last_elapsed
    }

    /// Progress through the nominal duration as of the last `elapsed` call
    pub fn progress(&self) -> f64 {
        (self.last_elapsed / self.total_duration_secs).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
        assert_eq!(PlaybackState::Playing.to_string(), "Playing");
        assert!(!PlaybackState::Stopped.is_playing());
    }

    #[test]
    fn test_progress_tracks_elapsed() {
        let mut clock = ProgressClock::start(2.0, 20.0);
        assert_relative_eq!(clock.elapsed(12.0), 10.0);
        assert_relative_eq!(clock.progress(), 0.5);
    }

    #[test]
    fn test_progress_clamped() {
        let mut clock = ProgressClock::start(0.0, 20.0);
        clock.elapsed(45.0);
        assert_eq!(clock.progress(), 1.0);
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let mut clock = ProgressClock::start(5.0, 20.0);
        assert_relative_eq!(clock.elapsed(8.0), 3.0);
        assert_relative_eq!(clock.elapsed(7.0), 3.0);
        assert_eq!(clock.elapsed(1.0), 3.0);
    }
}
