//! Local playback actions
//!
//! Every control goes through the same steps: bail out while casting or
//! while echo suppression is armed, send the matching message if a party is
//! active (decided from the clock state before the change), then change the
//! local clock. Each returns whether the action was carried out.

use syncwatch_core::Message;
use tracing::debug;

use crate::clock::PlaybackClock;
use crate::engine::WatchParty;

impl WatchParty {
    /// The clock, if local controls may act on it right now
    fn controllable(&self, action: &str) -> Option<&dyn PlaybackClock> {
        if self.casting {
            debug!("casting, ignoring local {}", action);
            return None;
        }
        if self.echo.is_armed() {
            debug!("echo suppression armed, ignoring local {}", action);
            return None;
        }
        let clock = self.clock.as_deref();
        if clock.is_none() {
            debug!("no clock attached, ignoring local {}", action);
        }
        clock
    }

    pub async fn toggle_play_pause(&mut self) -> bool {
        let playing = match self.controllable("toggle") {
            Some(clock) => clock.is_playing(),
            None => return false,
        };
        let message = if playing { Message::Pause } else { Message::Play };
        self.emit(message).await;
        true
    }

    /// Start playback; does nothing if already playing
    pub async fn play(&mut self) -> bool {
        let paused = self
            .controllable("play")
            .map(|clock| !clock.is_playing())
            .unwrap_or(false);
        paused && self.toggle_play_pause().await
    }

    /// Pause playback; does nothing if already paused
    pub async fn pause(&mut self) -> bool {
        let playing = self
            .controllable("pause")
            .map(|clock| clock.is_playing())
            .unwrap_or(false);
        playing && self.toggle_play_pause().await
    }

    /// Jump relative to the current position, clamped to `[0, duration]`.
    ///
    /// Needs a known, positive duration.
    pub async fn seek_by(&mut self, delta: f64) -> bool {
        let target = match self.controllable("seek") {
            Some(clock) => match clock.duration() {
                Some(duration) if duration > 0.0 && delta.is_finite() => {
                    (clock.current_time() + delta).clamp(0.0, duration)
                }
                _ => {
                    debug!("duration unknown, ignoring relative seek");
                    return false;
                }
            },
            None => return false,
        };
        self.emit(Message::Seek { time: target }).await;
        true
    }

    /// Jump to an absolute position
    pub async fn seek_to(&mut self, time: f64) -> bool {
        if !time.is_finite() {
            debug!("ignoring seek to {}", time);
            return false;
        }
        let target = match self.controllable("seek") {
            Some(clock) => match clock.duration() {
                Some(duration) if duration > 0.0 => time.clamp(0.0, duration),
                _ => time.max(0.0),
            },
            None => return false,
        };
        self.emit(Message::Seek { time: target }).await;
        true
    }

    /// Jump to a fraction of the duration, as a scrub bar does
    pub async fn scrub_to(&mut self, fraction: f64) -> bool {
        if !fraction.is_finite() {
            return false;
        }
        let target = match self.controllable("scrub") {
            Some(clock) => match clock.duration() {
                Some(duration) if duration > 0.0 => fraction.clamp(0.0, 1.0) * duration,
                _ => {
                    debug!("duration unknown, ignoring scrub");
                    return false;
                }
            },
            None => return false,
        };
        self.emit(Message::Seek { time: target }).await;
        true
    }

    /// Send (when a party is active), then change the local clock
    async fn emit(&mut self, message: Message) {
        if self.active {
            self.send_message(&message, None).await;
        }
        if let Some(clock) = self.clock.as_deref_mut() {
            match message {
                Message::Play => clock.play(),
                Message::Pause => clock.pause(),
                Message::Seek { time } => clock.set_time(time),
                _ => {}
            }
        }
    }
}
