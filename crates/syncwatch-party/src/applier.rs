//! Playback command applier
//!
//! Turns an accepted remote message into clock commands. PLAY and PAUSE are
//! idempotent, SEEK has a dead-band so small drift does not cause stutter,
//! and a SYNC_RESPONSE is authoritative.

use syncwatch_core::Message;
use tracing::debug;

use crate::clock::PlaybackClock;
use crate::engine::WatchParty;

/// What a message did to the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Played,
    Paused,
    Seeked,
    Synced,
    /// Already in the requested state, or inside the seek dead-band
    Unchanged,
}

/// Apply one message to a clock
pub fn apply(clock: &mut dyn PlaybackClock, message: &Message, seek_tolerance: f64) -> Applied {
    match *message {
        Message::Play => {
            if clock.is_playing() {
                Applied::Unchanged
            } else {
                clock.play();
                Applied::Played
            }
        }
        Message::Pause => {
            if clock.is_playing() {
                clock.pause();
                Applied::Paused
            } else {
                Applied::Unchanged
            }
        }
        Message::Seek { time } => {
            if (time - clock.current_time()).abs() > seek_tolerance {
                clock.set_time(time);
                Applied::Seeked
            } else {
                Applied::Unchanged
            }
        }
        Message::SyncResponse { time, is_playing } => {
            clock.set_time(time);
            if is_playing {
                clock.play();
            } else {
                clock.pause();
            }
            Applied::Synced
        }
        Message::SyncRequest => Applied::Unchanged,
    }
}

impl WatchParty {
    /// Apply a message that arrived from the network.
    ///
    /// Returns `None` when the message was dropped. Echo suppression is armed
    /// before the clock is touched.
    pub(crate) fn apply_remote(&mut self, message: &Message) -> Option<Applied> {
        if self.casting {
            debug!("casting, dropping remote {}", message.kind());
            return None;
        }
        if matches!(message, Message::SyncRequest) {
            return None;
        }
        let tolerance = self.config.seek_tolerance_secs;
        let clock = match self.clock.as_deref_mut() {
            Some(clock) => clock,
            None => {
                debug!("no clock attached, dropping remote {}", message.kind());
                return None;
            }
        };

        self.echo.arm();
        let applied = apply(clock, message, tolerance);
        debug!("applied remote {}: {:?}", message.kind(), applied);
        Some(applied)
    }
}
