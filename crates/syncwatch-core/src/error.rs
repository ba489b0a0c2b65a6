//! Error types for SyncWatch wire handling

use thiserror::Error;

/// Result type alias for SyncWatch wire operations
pub type Result<T> = std::result::Result<T, Error>;

/// SyncWatch wire error types
#[derive(Error, Debug)]
pub enum Error {
    /// JSON encoding error
    #[error("encode error: {0}")]
    EncodeError(String),

    /// JSON decoding error (malformed payload, missing or mistyped fields)
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Well-formed payload with a `type` this protocol does not know
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Playback position that cannot be represented on the wire
    #[error("invalid playback time: {0}")]
    InvalidTime(f64),
}

impl Error {
    /// Unknown message kinds are expected from newer peers and are not faults
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Error::UnknownMessageType(_))
    }
}
