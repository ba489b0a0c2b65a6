//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("address already in use: {0}")]
    AddressInUse(String),

    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected")]
    NotConnected,

    #[error("endpoint destroyed")]
    Destroyed,

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Errors that mean the requested identity could not be registered
    pub fn is_identity_error(&self) -> bool {
        match self {
            TransportError::AddressInUse(_) => true,
            TransportError::Io(e) => e.kind() == std::io::ErrorKind::AddrInUse,
            _ => false,
        }
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Other(e.to_string())
    }
}
