//! SyncWatch Core
//!
//! Wire types and encoding for the SyncWatch watch-party protocol.
//!
//! This crate provides:
//! - Playback messages exchanged between host and guests ([`Message`])
//! - Clock snapshots used for late-join catch-up ([`PlaybackSnapshot`])
//! - JSON encoding/decoding ([`codec`])

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use types::*;

/// Default WebSocket port for hosts
pub const DEFAULT_WS_PORT: u16 = 7340;

/// WebSocket subprotocol identifier
pub const WS_SUBPROTOCOL: &str = "syncwatch.v1";

/// How long a remotely applied command suppresses local re-emission
pub const ECHO_SUPPRESSION_MS: u64 = 200;

/// Remote seeks closer than this to the local position are ignored
pub const SEEK_TOLERANCE_SECS: f64 = 1.5;

/// Query parameter carrying the party id in share links
pub const SHARE_QUERY_PARAM: &str = "party";
