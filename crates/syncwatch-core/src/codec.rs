//! JSON encoding for SyncWatch messages
//!
//! Messages travel as single JSON objects with a `type` discriminator,
//! e.g. `{"type":"SEEK","time":42.0}`. There is no version field; peers
//! ignore kinds they do not understand.

use bytes::Bytes;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::Message;

/// Encode a message to its JSON wire form
pub fn encode(message: &Message) -> Result<Bytes> {
    if let Some(time) = message.time() {
        if !time.is_finite() {
            return Err(Error::InvalidTime(time));
        }
    }

    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| Error::EncodeError(e.to_string()))
}

/// Decode a message from its JSON wire form.
///
/// Returns [`Error::UnknownMessageType`] for well-formed objects whose `type`
/// is not one of ours, so callers can tell forward-compatible traffic apart
/// from garbage.
pub fn decode(data: &[u8]) -> Result<Message> {
    let value: Value =
        serde_json::from_slice(data).map_err(|e| Error::DecodeError(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::DecodeError("missing \"type\" field".to_string()))?;

    if !Message::is_known_kind(kind) {
        return Err(Error::UnknownMessageType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| Error::DecodeError(e.to_string()))
}
