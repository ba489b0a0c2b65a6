//! Party engine error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PartyError>;

#[derive(Error, Debug)]
pub enum PartyError {
    #[error("transport error: {0}")]
    Transport(#[from] syncwatch_transport::TransportError),

    #[error("invalid party id: {0:?}")]
    InvalidPartyId(String),

    #[error("invalid share link: {0}")]
    InvalidLink(String),

    #[error("party runtime stopped")]
    RuntimeStopped,
}

impl From<url::ParseError> for PartyError {
    fn from(e: url::ParseError) -> Self {
        PartyError::InvalidLink(e.to_string())
    }
}
