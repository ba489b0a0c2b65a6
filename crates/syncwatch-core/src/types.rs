//! Protocol types and message definitions

use serde::{Deserialize, Serialize};

/// Wire names of every message kind, in declaration order
pub const MESSAGE_TYPES: [&str; 5] = ["PLAY", "PAUSE", "SEEK", "SYNC_REQUEST", "SYNC_RESPONSE"];

/// A playback message exchanged over a party channel.
///
/// Messages carry no sender or session identity: the channel that delivered
/// a message identifies its origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Resume playback
    Play,
    /// Pause playback
    Pause,
    /// Jump to a position (seconds)
    Seek { time: f64 },
    /// Guest asks the host for its current playback state
    SyncRequest,
    /// Host's authoritative answer to a sync request
    SyncResponse {
        time: f64,
        #[serde(rename = "isPlaying")]
        is_playing: bool,
    },
}

impl Message {
    /// Wire name of this message's kind
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Play => MESSAGE_TYPES[0],
            Message::Pause => MESSAGE_TYPES[1],
            Message::Seek { .. } => MESSAGE_TYPES[2],
            Message::SyncRequest => MESSAGE_TYPES[3],
            Message::SyncResponse { .. } => MESSAGE_TYPES[4],
        }
    }

    /// Whether the wire name denotes a kind this protocol understands
    pub fn is_known_kind(kind: &str) -> bool {
        MESSAGE_TYPES.contains(&kind)
    }

    /// The playback position carried by this message, if any
    pub fn time(&self) -> Option<f64> {
        match self {
            Message::Seek { time } | Message::SyncResponse { time, .. } => Some(*time),
            _ => None,
        }
    }
}

/// Point-in-time view of a playback clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    /// Position in seconds
    pub time: f64,
    /// Whether the clock is advancing
    pub is_playing: bool,
}

impl PlaybackSnapshot {
    pub fn new(time: f64, is_playing: bool) -> Self {
        Self { time, is_playing }
    }

    /// The sync response that carries this snapshot
    pub fn into_response(self) -> Message {
        Message::SyncResponse {
            time: self.time,
            is_playing: self.is_playing,
        }
    }
}

impl From<PlaybackSnapshot> for Message {
    fn from(snapshot: PlaybackSnapshot) -> Self {
        snapshot.into_response()
    }
}
