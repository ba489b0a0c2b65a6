//! Playback clock abstraction
//!
//! The engine never decodes media. It reads and steers whatever plays it
//! through [`PlaybackClock`]: a position that advances while playing, plus
//! play/pause/seek commands.

use syncwatch_core::PlaybackSnapshot;
use tokio::time::Instant;

/// A controllable media clock
pub trait PlaybackClock: Send + Sync {
    /// Current position in seconds
    fn current_time(&self) -> f64;

    /// Whether the position is advancing
    fn is_playing(&self) -> bool;

    /// Media duration in seconds, `None` while unknown
    fn duration(&self) -> Option<f64>;

    /// Jump to a position
    fn set_time(&mut self, time: f64);

    fn play(&mut self);

    fn pause(&mut self);

    /// Position and playing state read together
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot::new(self.current_time(), self.is_playing())
    }
}

/// A clock that advances with the runtime's time source.
///
/// Stands in for a media element in headless peers; position is clamped to
/// `[0, duration]` and playback stops advancing at the end.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    position: f64,
    started_at: Option<Instant>,
    duration: Option<f64>,
}

impl SimulatedClock {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            position: 0.0,
            started_at: None,
            duration,
        }
    }

    fn clamp(&self, time: f64) -> f64 {
        let time = time.max(0.0);
        match self.duration {
            Some(duration) => time.min(duration),
            None => time,
        }
    }

    fn at_end(&self, time: f64) -> bool {
        matches!(self.duration, Some(duration) if time >= duration)
    }
}

impl PlaybackClock for SimulatedClock {
    fn current_time(&self) -> f64 {
        match self.started_at {
            Some(at) => self.clamp(self.position + at.elapsed().as_secs_f64()),
            None => self.position,
        }
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some() && !self.at_end(self.current_time())
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn set_time(&mut self, time: f64) {
        self.position = self.clamp(time);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    fn play(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.position = self.current_time();
        self.started_at = None;
    }
}
